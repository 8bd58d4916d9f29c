//! # audio-engine
//!
//! Cross-platform audio capture: raw PCM from microphones and rendered
//! system output, delivered to an asynchronous consumer.
//!
//! One backend is compiled per platform (WASAPI on Windows, AVFoundation +
//! ScreenCaptureKit on macOS) and [`new_engine`] returns it behind the
//! [`AudioEngine`] contract. Regardless of backend, delivered buffers are
//! interleaved signed 16-bit little-endian PCM; consumers learn the rate
//! and channel count from [`AudioEngine::device_format`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use audio_engine::{bridge, new_engine, BridgeEvent, DeviceType};
//!
//! let mut engine = new_engine()?;
//! let mic = engine
//!     .devices()?
//!     .into_iter()
//!     .find(|d| d.device_type == DeviceType::Input && d.is_default)
//!     .expect("no default microphone");
//!
//! let (sink, receiver) = bridge::channel();
//! engine.start(DeviceType::Input, &mic.id, Arc::new(sink))?;
//! while let Some(BridgeEvent::Data(pcm)) =
//!     receiver.next_timeout(std::time::Duration::from_secs(1))
//! {
//!     // consume pcm
//! }
//! engine.stop();
//! # Ok::<(), audio_engine::CaptureError>(())
//! ```

pub use audio_engine_core::bridge;
pub use audio_engine_core::{
    AudioEngine, BridgeEvent, BridgeReceiver, CaptureBridge, CaptureError, CaptureSink,
    ClosureSink, Device, DeviceFormat, DeviceType, PermissionKind, PermissionStatus, SessionStats,
    SharedSink, OUTPUT_BIT_DEPTH, SYSTEM_DEVICE_ID,
};

/// Construct the capture engine backend compiled into this artifact.
#[cfg(target_os = "windows")]
pub fn new_engine() -> Result<Box<dyn AudioEngine>, CaptureError> {
    Ok(Box::new(audio_engine_windows::WasapiEngine::new()))
}

/// Construct the capture engine backend compiled into this artifact.
#[cfg(target_os = "macos")]
pub fn new_engine() -> Result<Box<dyn AudioEngine>, CaptureError> {
    Ok(Box::new(audio_engine_macos::MacEngine::new()))
}

/// Construct the capture engine backend compiled into this artifact.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub fn new_engine() -> Result<Box<dyn AudioEngine>, CaptureError> {
    Err(CaptureError::UnsupportedOperation(
        "no capture backend for this platform".into(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use audio_engine_core::{SessionHandle, SharedStats};

    use super::*;

    const CHANNELS: usize = 2;
    const FRAMES_PER_BUFFER: usize = 128;

    /// In-process engine over a synthetic source. Mirrors the backend
    /// shape (producer thread, readiness handshake, asynchronous
    /// resolution errors) so the facade contract is exercised without OS
    /// devices. The source emits a wrapping int16 ramp, which makes
    /// ordering and completeness checkable byte-for-byte.
    struct SyntheticEngine {
        devices: Vec<Device>,
        session: Option<SessionHandle>,
        stats: SharedStats,
    }

    impl SyntheticEngine {
        fn new() -> Self {
            Self {
                devices: vec![
                    Device {
                        id: "m1".into(),
                        name: "Mic".into(),
                        device_type: DeviceType::Input,
                        is_default: true,
                    },
                    Device {
                        id: "o1".into(),
                        name: "Speakers".into(),
                        device_type: DeviceType::Output,
                        is_default: true,
                    },
                ],
                session: None,
                stats: SharedStats::new(),
            }
        }
    }

    impl AudioEngine for SyntheticEngine {
        fn start(
            &mut self,
            device_type: DeviceType,
            device_id: &str,
            sink: SharedSink,
        ) -> Result<(), CaptureError> {
            if let Some(session) = &self.session {
                if session.is_running() {
                    return Err(CaptureError::AlreadyRecording);
                }
                self.session = None;
            }
            if device_id.is_empty() {
                return Err(CaptureError::DeviceNotFound(device_id.into()));
            }

            self.stats.reset();
            let devices = self.devices.clone();
            let id = device_id.to_string();
            let stats = self.stats.clone();
            let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);

            let handle = SessionHandle::spawn("synthetic-capture", move |running| {
                let matches = devices
                    .iter()
                    .any(|d| d.device_type == device_type && d.id == id);
                if !matches {
                    let err = if devices.iter().any(|d| d.id == id) {
                        CaptureError::DeviceTypeMismatch {
                            id: id.clone(),
                            expected: device_type,
                        }
                    } else {
                        CaptureError::DeviceNotFound(id.clone())
                    };
                    sink.on_error(&err);
                    let _ = ready_tx.send(Err(err));
                    running.store(false, Ordering::SeqCst);
                    return;
                }

                let _ = ready_tx.send(Ok(()));
                let mut counter: u16 = 0;
                while running.load(Ordering::SeqCst) {
                    let mut pcm = Vec::with_capacity(FRAMES_PER_BUFFER * CHANNELS * 2);
                    for _ in 0..FRAMES_PER_BUFFER * CHANNELS {
                        pcm.extend_from_slice(&(counter as i16).to_le_bytes());
                        counter = counter.wrapping_add(1);
                    }
                    stats.record(pcm.len());
                    sink.on_data(&pcm);
                    thread::sleep(Duration::from_millis(5));
                }
            })?;

            match ready_rx.recv() {
                Ok(Ok(())) => {
                    self.session = Some(handle);
                    Ok(())
                }
                _ => {
                    drop(handle);
                    Ok(())
                }
            }
        }

        fn stop(&mut self) {
            if let Some(session) = self.session.take() {
                session.stop();
            }
        }

        fn devices(&self) -> Result<Vec<Device>, CaptureError> {
            Ok(self.devices.clone())
        }

        fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
            if self.devices.iter().any(|d| d.id == device_id) {
                Ok(DeviceFormat::with_native(48_000, CHANNELS as u16, 32))
            } else {
                Err(CaptureError::DeviceNotFound(device_id.into()))
            }
        }

        fn check_permission(&self) -> PermissionStatus {
            PermissionStatus::granted()
        }

        fn request_permission(&self, _kind: PermissionKind) -> bool {
            true
        }

        fn stats(&self) -> SessionStats {
            self.stats.snapshot()
        }
    }

    fn bridge_pair() -> (SharedSink, BridgeReceiver) {
        let (sink, receiver) = bridge::channel();
        (Arc::new(sink), receiver)
    }

    fn first_data(receiver: &BridgeReceiver) -> Vec<u8> {
        for _ in 0..50 {
            match receiver.next_timeout(Duration::from_millis(100)) {
                Some(BridgeEvent::Data(pcm)) => return pcm,
                Some(BridgeEvent::Error(err)) => panic!("unexpected error: {err}"),
                None => {}
            }
        }
        panic!("no data delivered");
    }

    #[test]
    fn enumeration_yields_typed_defaults() {
        let engine = SyntheticEngine::new();
        let devices = engine.devices().unwrap();
        assert_eq!(devices.len(), 2);
        for device in &devices {
            assert!(!device.id.is_empty());
        }
        let default_inputs = devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Input && d.is_default)
            .count();
        let default_outputs = devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Output && d.is_default)
            .count();
        assert_eq!(default_inputs, 1);
        assert_eq!(default_outputs, 1);
    }

    #[test]
    fn start_rejects_empty_id() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        let err = engine.start(DeviceType::Input, "", sink).unwrap_err();
        assert_eq!(err.code(), "DEVICE_NOT_FOUND");
        assert!(receiver.try_next().is_none());
    }

    #[test]
    fn double_start_is_rejected_and_first_session_survives() {
        let mut engine = SyntheticEngine::new();
        let (sink1, receiver1) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink1).unwrap();
        let _ = first_data(&receiver1);

        let (sink2, receiver2) = bridge_pair();
        let err = engine
            .start(DeviceType::Input, "m1", sink2)
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RECORDING");

        // The first session keeps flowing; the second sink never fires.
        let _ = first_data(&receiver1);
        assert!(receiver2.try_next().is_none());

        engine.stop();
    }

    #[test]
    fn unknown_device_reports_through_sink_and_engine_stays_startable() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        engine
            .start(DeviceType::Output, "nonexistent", sink)
            .unwrap();

        match receiver.next_timeout(Duration::from_millis(500)) {
            Some(BridgeEvent::Error(err)) => assert_eq!(err.code(), "DEVICE_NOT_FOUND"),
            other => panic!("expected an error event, got {other:?}"),
        }

        // The failed start left the session inactive.
        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink).unwrap();
        let _ = first_data(&receiver);
        engine.stop();
    }

    #[test]
    fn opposite_direction_id_is_a_type_mismatch() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Output, "m1", sink).unwrap();

        match receiver.next_timeout(Duration::from_millis(500)) {
            Some(BridgeEvent::Error(err)) => {
                assert_eq!(err.code(), "DEVICE_TYPE_MISMATCH")
            }
            other => panic!("expected an error event, got {other:?}"),
        }
    }

    #[test]
    fn stop_silences_both_callbacks() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink).unwrap();
        let _ = first_data(&receiver);

        engine.stop();
        receiver.drain();

        // Nothing may arrive after stop has returned.
        assert!(receiver.next_timeout(Duration::from_millis(500)).is_none());
    }

    #[test]
    fn engine_restarts_with_independent_device_selection() {
        let mut engine = SyntheticEngine::new();

        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink).unwrap();
        let _ = first_data(&receiver);
        engine.stop();

        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Output, "o1", sink).unwrap();
        let _ = first_data(&receiver);
        engine.stop();
    }

    #[test]
    fn buffers_are_whole_frames() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink).unwrap();

        for _ in 0..5 {
            let pcm = first_data(&receiver);
            assert!(!pcm.is_empty());
            assert_eq!(pcm.len() % (2 * CHANNELS), 0);
        }
        engine.stop();
    }

    #[test]
    fn delivery_preserves_capture_order() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink).unwrap();

        let mut samples = Vec::new();
        while samples.len() < FRAMES_PER_BUFFER * CHANNELS * 4 {
            let pcm = first_data(&receiver);
            for chunk in pcm.chunks_exact(2) {
                samples.push(u16::from_le_bytes([chunk[0], chunk[1]]));
            }
        }
        engine.stop();

        // The ramp is strictly sequential; any reorder or loss breaks it.
        for pair in samples.windows(2) {
            assert_eq!(pair[1], pair[0].wrapping_add(1));
        }
    }

    #[test]
    fn granted_permissions_are_idempotent() {
        let engine = SyntheticEngine::new();
        assert!(engine.request_permission(PermissionKind::Mic));
        assert!(engine.request_permission(PermissionKind::Mic));
        let status = engine.check_permission();
        assert!(status.mic && status.system);
    }

    #[test]
    fn stats_track_deliveries() {
        let mut engine = SyntheticEngine::new();
        let (sink, receiver) = bridge_pair();
        engine.start(DeviceType::Input, "m1", sink).unwrap();
        let first = first_data(&receiver);
        engine.stop();

        let stats = engine.stats();
        assert!(stats.buffers_delivered >= 1);
        assert!(stats.bytes_delivered >= first.len() as u64);
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn factory_refuses_unsupported_platforms() {
        let err = new_engine().err().expect("no backend expected here");
        assert_eq!(err.code(), "UNSUPPORTED_OPERATION");
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    #[test]
    fn factory_returns_a_backend() {
        assert!(new_engine().is_ok());
    }
}
