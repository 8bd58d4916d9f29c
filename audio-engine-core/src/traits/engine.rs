use crate::models::device::{Device, DeviceFormat, DeviceType};
use crate::models::error::CaptureError;
use crate::models::permission::{PermissionKind, PermissionStatus};
use crate::session::SessionStats;
use crate::traits::sink::SharedSink;

/// The capture engine contract, implemented once per platform backend and
/// selected by the platform factory at construction.
///
/// Session lifecycle:
/// ```text
/// start(type, id, sink) ──▶ capturing ──▶ stop()
///        │                     │
///        │  sink.on_error      │ sink.on_data / sink.on_error
///        ▼  (init failure)     ▼
///    inactive              inactive, callbacks silent
/// ```
///
/// At most one session is active per engine instance. `&mut self` on both
/// `start` and `stop` makes the caller serialize them; the engine does not
/// serialize the pair internally.
pub trait AudioEngine: Send {
    /// Begin a capture session on `(device_type, device_id)`.
    ///
    /// Synchronous precondition failures (an empty id, or a session already
    /// active) are returned as `Err` before any thread is spawned.
    /// Resolution and initialization failures discovered on the producer
    /// side (`DEVICE_NOT_FOUND`, `DEVICE_TYPE_MISMATCH`, `PERMISSION_DENIED`,
    /// runtime classifications) are delivered through `sink.on_error` and
    /// leave the session inactive.
    ///
    /// Returns once the underlying audio client has reached running state,
    /// or once the failure has been delivered.
    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        sink: SharedSink,
    ) -> Result<(), CaptureError>;

    /// Tear the active session down.
    ///
    /// Idempotent; a no-op with no active session. Blocks until the producer
    /// thread has terminated and platform handles are released. After this
    /// returns, neither sink callback fires again. Must not be called from
    /// the producer thread itself.
    fn stop(&mut self);

    /// Enumerate all devices, both directions.
    ///
    /// Callable with or without an active session; returns a snapshot and
    /// allocates no long-lived platform state.
    fn devices(&self) -> Result<Vec<Device>, CaptureError>;

    /// Stream format of the device with the given id.
    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError>;

    /// Non-prompting permission query. `(true, true)` on platforms without
    /// permission gates.
    fn check_permission(&self) -> PermissionStatus;

    /// Request a capture permission, blocking until the user responds or
    /// the request times out (30 s). Immediately `true` on platforms
    /// without gates, and idempotent once granted.
    fn request_permission(&self, kind: PermissionKind) -> bool;

    /// Delivery counters for the current or most recent session.
    fn stats(&self) -> SessionStats {
        SessionStats::default()
    }
}
