//! # audio-engine-macos
//!
//! macOS backend for the audio capture engine.
//!
//! Provides:
//! - `MacEngine` — the [`audio_engine_core::AudioEngine`] implementation
//! - `mic` — microphone capture via an `AVCaptureSession` with an audio
//!   data output converting to int16/48 kHz/stereo
//! - `system` — system-audio capture via a ScreenCaptureKit stream with
//!   `capturesAudio` enabled (macOS 13.0+)
//! - `permissions` — TCC gating for microphone and screen/system-audio
//!   recording
//!
//! ## Device namespace
//! Input devices carry their AVFoundation unique ids; all render output is
//! collapsed into the single reserved `("output", "system")` device. Both
//! backends deliver interleaved signed 16-bit little-endian PCM at 48 kHz,
//! 2 channels.
//!
//! ## Bundle metadata
//! The embedding process must declare `NSMicrophoneUsageDescription` for
//! microphone capture and screen-recording intent for system audio;
//! without them session startup fails with a permission error.

#[cfg(target_os = "macos")]
pub mod devices;
#[cfg(target_os = "macos")]
pub mod engine;
#[cfg(target_os = "macos")]
pub mod mic;
#[cfg(target_os = "macos")]
pub mod permissions;
#[cfg(target_os = "macos")]
pub mod system;

#[cfg(target_os = "macos")]
pub use engine::MacEngine;
