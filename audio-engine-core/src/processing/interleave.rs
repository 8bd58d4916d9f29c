//! Planar-to-interleaved quantization.
//!
//! Some OS capture paths deliver non-interleaved float audio: each channel
//! occupies its own contiguous plane. The output contract is interleaved
//! int16, so `(frame, channel)` pairs are woven together while quantizing.

use crate::processing::sample_convert::pcm16_from_f32;

/// Interleave `planes.len()` channels of planar f32 audio into int16
/// little-endian bytes.
///
/// Sample `(frame, channel)` is read from `planes[channel][frame]`, clipped,
/// quantized, and written to output index `frame * channels + channel`.
/// Frames beyond a short plane are treated as silence. Output length =
/// `frames × planes.len() × 2` bytes.
pub fn interleave_planar_f32(planes: &[&[f32]], frames: usize) -> Vec<u8> {
    let channels = planes.len();
    let mut out = Vec::with_capacity(frames * channels * 2);
    for frame in 0..frames {
        for plane in planes {
            let sample = plane.get(frame).copied().unwrap_or(0.0);
            out.extend_from_slice(&pcm16_from_f32(sample).to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int16_at(bytes: &[u8], index: usize) -> i16 {
        i16::from_le_bytes([bytes[index * 2], bytes[index * 2 + 1]])
    }

    #[test]
    fn sine_left_silent_right() {
        let frames = 1024;
        let left: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0).sin() * 0.5)
            .collect();
        let right = vec![0.0f32; frames];

        let bytes = interleave_planar_f32(&[&left, &right], frames);

        assert_eq!(bytes.len(), frames * 2 * 2);
        for frame in 0..frames {
            assert_eq!(int16_at(&bytes, frame * 2), pcm16_from_f32(left[frame]));
            assert_eq!(int16_at(&bytes, frame * 2 + 1), 0);
        }
    }

    #[test]
    fn clips_out_of_range_planes() {
        let hot = [2.0f32, -2.0];
        let bytes = interleave_planar_f32(&[&hot], 2);
        assert_eq!(int16_at(&bytes, 0), 32767);
        assert_eq!(int16_at(&bytes, 1), -32767);
    }

    #[test]
    fn short_plane_pads_with_silence() {
        let left = [0.5f32, 0.5];
        let right = [0.25f32];
        let bytes = interleave_planar_f32(&[&left, &right], 2);
        assert_eq!(bytes.len(), 8);
        assert_eq!(int16_at(&bytes, 1), pcm16_from_f32(0.25));
        assert_eq!(int16_at(&bytes, 3), 0);
    }

    #[test]
    fn empty_input() {
        assert!(interleave_planar_f32(&[], 0).is_empty());
        let plane: [f32; 0] = [];
        assert!(interleave_planar_f32(&[&plane], 0).is_empty());
    }
}
