//! WAVEFORMATEX parsing.
//!
//! The shared-mode mix format is usually 32-bit float, but capture clients
//! can negotiate 16/24/32-bit PCM, and extensible descriptors hide the real
//! encoding behind a subformat GUID plus a valid-bits field. This module
//! reduces all of that to a [`StreamLayout`] the capture loop and the format
//! query share.

use windows::core::GUID;
use windows::Win32::Media::Audio::{WAVEFORMATEX, WAVEFORMATEXTENSIBLE};

use audio_engine_core::SampleKind;

const WAVE_FORMAT_PCM_TAG: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT_TAG: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE_TAG: u16 = 0xFFFE;

const KSDATAFORMAT_SUBTYPE_PCM: GUID = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
const KSDATAFORMAT_SUBTYPE_IEEE_FLOAT: GUID =
    GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

/// Decoded stream description of a WASAPI endpoint.
#[derive(Debug, Clone, Copy)]
pub struct StreamLayout {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per frame (all channels).
    pub block_align: u16,
    /// Meaningful bits per sample (24 for 24-in-32 containers).
    pub valid_bits: u16,
    pub kind: SampleKind,
}

impl StreamLayout {
    /// Container bytes per single-channel sample.
    pub fn sample_stride(&self) -> usize {
        (self.block_align / self.channels.max(1)) as usize
    }

    /// Total samples in a packet of `frames` frames.
    pub fn samples_in(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

/// Reduce a WAVEFORMATEX (possibly extensible) to a [`StreamLayout`].
///
/// Formats the engine cannot decode come back as `SampleKind::Unknown`;
/// the capture loop renders those as silence instead of failing the
/// session.
pub fn parse_wave_format(format: &WAVEFORMATEX) -> StreamLayout {
    let container_bits = format.wBitsPerSample;
    let mut valid_bits = container_bits;
    let is_float;

    match format.wFormatTag {
        WAVE_FORMAT_EXTENSIBLE_TAG => {
            // The extensible header may sit in an unaligned CoTaskMem block;
            // read the tail fields without assuming alignment.
            let ext = unsafe { &*(format as *const WAVEFORMATEX as *const WAVEFORMATEXTENSIBLE) };
            let sub_format =
                unsafe { std::ptr::read_unaligned(std::ptr::addr_of!(ext.SubFormat)) };
            let ext_valid = unsafe {
                std::ptr::read_unaligned(std::ptr::addr_of!(ext.Samples.wValidBitsPerSample))
            };
            if ext_valid > 0 {
                valid_bits = ext_valid;
            }
            is_float = sub_format == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;
            if !is_float && sub_format != KSDATAFORMAT_SUBTYPE_PCM {
                return unknown_layout(format, valid_bits);
            }
        }
        WAVE_FORMAT_IEEE_FLOAT_TAG => is_float = true,
        WAVE_FORMAT_PCM_TAG => is_float = false,
        _ => return unknown_layout(format, valid_bits),
    }

    let kind = if is_float {
        if container_bits == 32 {
            SampleKind::Float32
        } else {
            SampleKind::Unknown
        }
    } else {
        match container_bits {
            16 => SampleKind::Int16,
            24 => SampleKind::Int24,
            // 24-in-32 containers are left-justified, so a full 32-bit read
            // scales identically.
            32 => SampleKind::Int32,
            _ => SampleKind::Unknown,
        }
    };

    StreamLayout {
        sample_rate: format.nSamplesPerSec,
        channels: format.nChannels,
        block_align: format.nBlockAlign,
        valid_bits,
        kind,
    }
}

fn unknown_layout(format: &WAVEFORMATEX, valid_bits: u16) -> StreamLayout {
    StreamLayout {
        sample_rate: format.nSamplesPerSec,
        channels: format.nChannels,
        block_align: format.nBlockAlign,
        valid_bits,
        kind: SampleKind::Unknown,
    }
}
