use thiserror::Error;

use super::device::DeviceType;

/// Errors that can occur during audio capture operations.
///
/// Every variant maps to a stable, machine-readable classification string
/// (see [`CaptureError::code`]) that is carried verbatim to the consumer;
/// the `Display` form prefixes the detail with that code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// `(type, id)` does not resolve to any known device.
    #[error("DEVICE_NOT_FOUND: no device with id `{0}`")]
    DeviceNotFound(String),

    /// The id resolves to a device of the opposite direction.
    #[error("DEVICE_TYPE_MISMATCH: device `{id}` is not an {expected} device")]
    DeviceTypeMismatch { id: String, expected: DeviceType },

    /// The OS denied access to the requested source.
    #[error("PERMISSION_DENIED: access to the audio source was denied")]
    PermissionDenied,

    /// `start` was called while a session is already active.
    #[error("ALREADY_RECORDING: a capture session is already active")]
    AlreadyRecording,

    /// The feature requires a newer OS version or an unavailable subsystem.
    #[error("UNSUPPORTED_OPERATION: {0}")]
    UnsupportedOperation(String),

    /// Runtime failure detected by a per-packet OS error return, or a hard
    /// initialization failure on the producer thread.
    #[error("DEVICE_DISCONNECTED: {0}")]
    DeviceDisconnected(String),
}

impl CaptureError {
    /// Stable classification string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::DeviceTypeMismatch { .. } => "DEVICE_TYPE_MISMATCH",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::AlreadyRecording => "ALREADY_RECORDING",
            Self::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            Self::DeviceDisconnected(_) => "DEVICE_DISCONNECTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_classification() {
        let err = CaptureError::DeviceNotFound("nonexistent".into());
        assert!(err.to_string().starts_with("DEVICE_NOT_FOUND"));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn codes_are_stable() {
        let mismatch = CaptureError::DeviceTypeMismatch {
            id: "o1".into(),
            expected: DeviceType::Input,
        };
        assert_eq!(mismatch.code(), "DEVICE_TYPE_MISMATCH");
        assert_eq!(CaptureError::AlreadyRecording.code(), "ALREADY_RECORDING");
        assert_eq!(CaptureError::PermissionDenied.code(), "PERMISSION_DENIED");
        assert_eq!(
            CaptureError::DeviceDisconnected("GetBuffer failed".into()).code(),
            "DEVICE_DISCONNECTED"
        );
    }
}
