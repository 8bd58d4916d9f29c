//! macOS capture engine.
//!
//! Dispatches `(Input, id)` sessions to the AVFoundation microphone backend
//! and `(Output, "system")` to the ScreenCaptureKit backend. Both deliver
//! the common output format, so the facade contract is identical to the
//! Windows engine's.

use std::sync::Arc;

use audio_engine_core::{
    AudioEngine, CaptureError, Device, DeviceFormat, DeviceType, PermissionKind, PermissionStatus,
    SessionStats, SharedSink, SharedStats, SYSTEM_DEVICE_ID,
};

use crate::devices;
use crate::mic::MicCapture;
use crate::permissions;
use crate::system::SystemAudioCapture;

enum ActiveSession {
    Mic(MicCapture),
    System(SystemAudioCapture),
}

impl ActiveSession {
    fn is_running(&self) -> bool {
        match self {
            Self::Mic(capture) => capture.is_running(),
            Self::System(capture) => capture.is_running(),
        }
    }

    fn stop(&mut self) {
        match self {
            Self::Mic(capture) => capture.stop(),
            Self::System(capture) => capture.stop(),
        }
    }
}

/// macOS-backed [`AudioEngine`].
pub struct MacEngine {
    session: Option<ActiveSession>,
    stats: SharedStats,
}

impl MacEngine {
    pub fn new() -> Self {
        Self {
            session: None,
            stats: SharedStats::new(),
        }
    }

    /// Reap a session the OS already terminated (stream-stopped-with-error),
    /// so a new `start` is allowed after an asynchronous failure.
    fn reap_dead_session(&mut self) {
        if let Some(session) = &self.session {
            if !session.is_running() {
                self.session = None;
            }
        }
    }

    /// Classify an id that cannot begin a session of the requested type.
    fn selector_error(device_type: DeviceType, device_id: &str) -> CaptureError {
        let known_opposite = match device_type {
            DeviceType::Input => device_id == SYSTEM_DEVICE_ID,
            DeviceType::Output => devices::is_input_device(device_id),
        };
        if known_opposite {
            CaptureError::DeviceTypeMismatch {
                id: device_id.into(),
                expected: device_type,
            }
        } else {
            CaptureError::DeviceNotFound(device_id.into())
        }
    }
}

impl Default for MacEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for MacEngine {
    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        sink: SharedSink,
    ) -> Result<(), CaptureError> {
        self.reap_dead_session();
        if self.session.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        if device_id.is_empty() {
            return Err(CaptureError::DeviceNotFound(device_id.into()));
        }

        self.stats.reset();

        let outcome = match device_type {
            DeviceType::Input => {
                if device_id == SYSTEM_DEVICE_ID {
                    Err(Self::selector_error(device_type, device_id))
                } else {
                    MicCapture::start(device_id, Arc::clone(&sink), self.stats.clone())
                        .map(ActiveSession::Mic)
                }
            }
            DeviceType::Output => {
                if device_id != SYSTEM_DEVICE_ID {
                    Err(Self::selector_error(device_type, device_id))
                } else {
                    SystemAudioCapture::start(Arc::clone(&sink), self.stats.clone())
                        .map(ActiveSession::System)
                }
            }
        };

        match outcome {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                // Resolution and initialization failures are delivered
                // through the sink; the session stays inactive and the
                // engine remains startable.
                log::error!("session start failed: {err}");
                sink.on_error(&err);
                Ok(())
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        Ok(devices::list_devices())
    }

    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
        if device_id.is_empty() {
            return Err(CaptureError::DeviceNotFound(device_id.into()));
        }
        devices::device_format(device_id)
    }

    fn check_permission(&self) -> PermissionStatus {
        permissions::check()
    }

    fn request_permission(&self, kind: PermissionKind) -> bool {
        permissions::request(kind)
    }

    fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }
}

impl Drop for MacEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// SAFETY: the retained AVFoundation / ScreenCaptureKit objects inside the
// active session are only touched from the thread that owns the engine;
// the OS-scheduled delegate queues share nothing but Send + Sync state.
unsafe impl Send for MacEngine {}
