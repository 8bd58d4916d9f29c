//! # audio-engine-core
//!
//! Platform-agnostic core of the audio capture engine.
//!
//! Defines the device model, the error taxonomy, the [`AudioEngine`]
//! contract that each platform backend implements, the [`CaptureSink`]
//! callback seam, pure PCM conversion math, and the ordered delivery
//! bridge that carries buffers from the real-time producer thread to a
//! cooperative consumer.
//!
//! ## Architecture
//!
//! ```text
//! audio-engine-core (this crate)
//! ├── traits/       ← AudioEngine, CaptureSink
//! ├── models/       ← Device, DeviceFormat, CaptureError, PermissionStatus
//! ├── processing/   ← sample decode, clip/quantize, planar interleave
//! ├── bridge        ← CaptureBridge / BridgeReceiver (FIFO crossing)
//! └── session       ← SessionHandle, delivery counters
//! ```
//!
//! Backends (`audio-engine-windows`, `audio-engine-macos`) emit interleaved
//! signed 16-bit little-endian PCM regardless of the native source format;
//! the `audio-engine` facade crate selects the backend for the compile
//! target.

pub mod bridge;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use bridge::{BridgeEvent, BridgeReceiver, CaptureBridge};
pub use models::device::{Device, DeviceFormat, DeviceType, OUTPUT_BIT_DEPTH, SYSTEM_DEVICE_ID};
pub use models::error::CaptureError;
pub use models::permission::{PermissionKind, PermissionStatus, PERMISSION_REQUEST_TIMEOUT};
pub use processing::sample_convert::SampleKind;
pub use session::{SessionHandle, SessionStats, SharedStats};
pub use traits::engine::AudioEngine;
pub use traits::sink::{CaptureSink, ClosureSink, SharedSink};
