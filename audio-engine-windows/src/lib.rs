//! # audio-engine-windows
//!
//! Windows WASAPI backend for the audio capture engine.
//!
//! Provides:
//! - `WasapiEngine` — the [`audio_engine_core::AudioEngine`] implementation
//! - `endpoints` — MMDevice enumeration (capture + render, defaults, names)
//! - `format` — WAVEFORMATEX(TENSIBLE) parsing into the core sample model
//!
//! ## Behavior
//! - Shared-mode, event-driven capture (`AUDCLNT_STREAMFLAGS_EVENTCALLBACK`);
//!   render endpoints are opened with the loopback flag so `Output` sessions
//!   capture what the device is playing.
//! - The device's mix format is kept: no resampling, native rate and channel
//!   count flow through to the int16 output.
//! - No permission gates exist on Windows; permission queries always grant.

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod endpoints;
#[cfg(target_os = "windows")]
pub mod engine;
#[cfg(target_os = "windows")]
pub mod format;
#[cfg(target_os = "windows")]
pub mod permissions;

#[cfg(target_os = "windows")]
pub use endpoints::EndpointEnumerator;
#[cfg(target_os = "windows")]
pub use engine::WasapiEngine;
