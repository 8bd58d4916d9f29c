pub mod interleave;
pub mod sample_convert;
