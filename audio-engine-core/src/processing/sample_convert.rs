//! Sample-format conversion.
//!
//! Everything the backends capture is normalized to `f32` in `[-1.0, 1.0]`
//! first, then clipped and quantized to the signed 16-bit little-endian
//! output format. All functions here are pure math with no platform
//! dependencies.

/// Source sample encoding of a raw capture buffer.
///
/// `Unknown` covers format tags the engine does not understand; those
/// buffers decode to silence rather than raw noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Float32,
    Int16,
    Int24,
    Int32,
    Unknown,
}

impl SampleKind {
    /// Container width in bytes, when the encoding implies one.
    pub fn sample_bytes(&self) -> Option<usize> {
        match self {
            Self::Float32 | Self::Int32 => Some(4),
            Self::Int16 => Some(2),
            Self::Int24 => Some(3),
            Self::Unknown => None,
        }
    }
}

/// Clip a normalized sample to `[-1.0, 1.0]` and quantize to int16.
#[inline]
pub fn pcm16_from_f32(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Quantize a normalized f32 buffer to interleaved int16 little-endian bytes.
///
/// Output length = `samples.len() * 2`.
pub fn pcm16_bytes_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&pcm16_from_f32(sample).to_le_bytes());
    }
    out
}

#[inline]
pub fn f32_from_i16(value: i16) -> f32 {
    value as f32 / 32768.0
}

/// Decode a packed little-endian 24-bit sample.
///
/// The three bytes are packed into the high 24 bits of a 32-bit integer so
/// the sign bit of the sample lands on the integer's sign bit (arithmetic
/// sign extension), then scaled by the full 32-bit range.
#[inline]
pub fn f32_from_i24_bytes(lo: u8, mid: u8, hi: u8) -> f32 {
    let wide = (((lo as u32) << 8) | ((mid as u32) << 16) | ((hi as u32) << 24)) as i32;
    wide as f32 / 2_147_483_648.0
}

#[inline]
pub fn f32_from_i32(value: i32) -> f32 {
    value as f32 / 2_147_483_648.0
}

/// Decode a raw capture buffer into normalized f32 samples.
///
/// `container_bytes` is the per-sample stride of the source stream; for the
/// known encodings it must match the encoding's own width. Unknown
/// encodings decode to silence of the same sample count.
pub fn decode_samples(bytes: &[u8], kind: SampleKind, container_bytes: usize) -> Vec<f32> {
    match kind {
        SampleKind::Float32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        SampleKind::Int16 => bytes
            .chunks_exact(2)
            .map(|b| f32_from_i16(i16::from_le_bytes([b[0], b[1]])))
            .collect(),
        SampleKind::Int24 => bytes
            .chunks_exact(3)
            .map(|b| f32_from_i24_bytes(b[0], b[1], b[2]))
            .collect(),
        SampleKind::Int32 => bytes
            .chunks_exact(4)
            .map(|b| f32_from_i32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            .collect(),
        SampleKind::Unknown => {
            let stride = container_bytes.max(1);
            vec![0.0; bytes.len() / stride]
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn quantization_endpoints() {
        assert_eq!(pcm16_from_f32(0.0), 0);
        assert_eq!(pcm16_from_f32(1.0), 32767);
        assert_eq!(pcm16_from_f32(-1.0), -32767);
    }

    #[test]
    fn quantization_clips_out_of_range() {
        assert_eq!(pcm16_from_f32(2.0), 32767);
        assert_eq!(pcm16_from_f32(-2.0), -32767);
    }

    #[test]
    fn quantization_truncates_toward_zero() {
        assert_eq!(pcm16_from_f32(0.5), 16383);
        assert_eq!(pcm16_from_f32(-0.5), -16383);
    }

    #[test]
    fn pcm_bytes_are_little_endian() {
        let bytes = pcm16_bytes_from_f32(&[0.0, 1.0, -1.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
    }

    #[test]
    fn i16_scaling() {
        assert_relative_eq!(f32_from_i16(i16::MIN), -1.0);
        assert_relative_eq!(f32_from_i16(16384), 0.5);
        assert_relative_eq!(f32_from_i16(0), 0.0);
    }

    #[test]
    fn i24_lowest_negative_reaches_full_scale() {
        // 0x800000 is the most negative 24-bit sample.
        let sample = f32_from_i24_bytes(0x00, 0x00, 0x80);
        assert_relative_eq!(sample, -1.0);
        let quantized = pcm16_from_f32(sample);
        assert!((quantized as i32 - (-32768)).abs() <= 1, "got {quantized}");
    }

    #[test]
    fn i24_highest_positive_reaches_full_scale() {
        // 0x7FFFFF is the most positive 24-bit sample.
        let sample = f32_from_i24_bytes(0xFF, 0xFF, 0x7F);
        let quantized = pcm16_from_f32(sample);
        assert!((quantized as i32 - 32767).abs() <= 1, "got {quantized}");
    }

    #[test]
    fn i24_sign_extension_for_high_byte() {
        // Any sample with the top byte >= 0x80 is negative.
        assert!(f32_from_i24_bytes(0x00, 0x00, 0xFF) < 0.0);
        assert!(f32_from_i24_bytes(0xFF, 0xFF, 0x00) > 0.0);
    }

    #[test]
    fn i32_scaling() {
        assert_relative_eq!(f32_from_i32(i32::MIN), -1.0);
        assert!(pcm16_from_f32(f32_from_i32(i32::MAX)) >= 32766);
    }

    #[test]
    fn decode_float32_is_verbatim() {
        let source = [0.25f32, -0.75];
        let bytes: Vec<u8> = source.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(decode_samples(&bytes, SampleKind::Float32, 4), source);
    }

    #[test]
    fn decode_int16_stream() {
        let bytes: Vec<u8> = [0i16, i16::MIN, 16384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let samples = decode_samples(&bytes, SampleKind::Int16, 2);
        assert_eq!(samples.len(), 3);
        assert_relative_eq!(samples[1], -1.0);
        assert_relative_eq!(samples[2], 0.5);
    }

    #[test]
    fn decode_int24_stream() {
        let bytes = [0x00, 0x00, 0x80, 0xFF, 0xFF, 0x7F];
        let samples = decode_samples(&bytes, SampleKind::Int24, 3);
        assert_eq!(samples.len(), 2);
        assert_relative_eq!(samples[0], -1.0);
        assert!(samples[1] > 0.999);
    }

    #[test]
    fn decode_unknown_yields_silence() {
        let bytes = [0xAA; 12];
        let samples = decode_samples(&bytes, SampleKind::Unknown, 4);
        assert_eq!(samples, vec![0.0; 3]);
    }
}
