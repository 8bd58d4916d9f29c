//! WASAPI capture engine.
//!
//! One producer thread per session. The thread initializes the COM
//! apartment, resolves the endpoint, opens a shared-mode event-driven audio
//! client (loopback-flagged for render endpoints), and drains packets into
//! the sink as int16 little-endian PCM until the running flag clears or a
//! hard OS failure ends the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_BUFFERFLAGS_SILENT, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK,
    AUDCLNT_STREAMFLAGS_NOPERSIST,
};
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use audio_engine_core::processing::sample_convert::{decode_samples, pcm16_bytes_from_f32};
use audio_engine_core::{
    AudioEngine, CaptureError, Device, DeviceFormat, DeviceType, PermissionKind, PermissionStatus,
    SessionHandle, SessionStats, SharedSink, SharedStats,
};

use crate::com::ComSession;
use crate::endpoints::EndpointEnumerator;
use crate::format::{parse_wave_format, StreamLayout};
use crate::permissions;

/// Requested shared-mode buffer period: 1 second in 100 ns units.
const BUFFER_DURATION_HNS: i64 = 10_000_000;

/// How long one wait on the capture event may block. Bounds how quickly the
/// loop notices a cleared running flag when the device goes quiet.
const EVENT_WAIT_MS: u32 = 2_000;

/// WASAPI-backed [`AudioEngine`].
pub struct WasapiEngine {
    session: Option<SessionHandle>,
    stats: SharedStats,
}

impl WasapiEngine {
    pub fn new() -> Self {
        Self {
            session: None,
            stats: SharedStats::new(),
        }
    }

    /// Reap a session whose producer already exited (error path), so a new
    /// `start` is allowed after an asynchronous failure.
    fn reap_dead_session(&mut self) {
        if let Some(session) = &self.session {
            if !session.is_running() {
                self.stop();
            }
        }
    }
}

impl Default for WasapiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for WasapiEngine {
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

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let id = device_id.to_string();
        let stats = self.stats.clone();
        let thread_sink = Arc::clone(&sink);

        let handle = SessionHandle::spawn("wasapi-capture", move |running| {
            capture_thread(running, device_type, id, thread_sink, stats, ready_tx);
        })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.session = Some(handle);
                Ok(())
            }
            Ok(Err(_)) => {
                // The producer delivered the failure through the sink and is
                // exiting; joining here leaves the session inactive.
                drop(handle);
                Ok(())
            }
            Err(_) => {
                drop(handle);
                let err = CaptureError::DeviceDisconnected(
                    "capture thread exited during initialization".into(),
                );
                sink.on_error(&err);
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
        let _com = ComSession::begin()?;
        EndpointEnumerator::new()?.devices()
    }

    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
        if device_id.is_empty() {
            return Err(CaptureError::DeviceNotFound(device_id.into()));
        }
        let _com = ComSession::begin()?;
        let device = EndpointEnumerator::new()?.device_by_id(device_id)?;

        unsafe {
            let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| {
                CaptureError::DeviceDisconnected(format!("Activate failed: {e}"))
            })?;
            let mix_format = audio_client.GetMixFormat().map_err(|e| {
                CaptureError::DeviceDisconnected(format!("GetMixFormat failed: {e}"))
            })?;
            let layout = parse_wave_format(&*mix_format);
            CoTaskMemFree(Some(mix_format as *const _ as *const _));

            Ok(DeviceFormat::with_native(
                layout.sample_rate,
                layout.channels,
                layout.valid_bits,
            ))
        }
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

impl Drop for WasapiEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer thread body: initialize, signal readiness, capture until the
/// flag clears or the device fails.
fn capture_thread(
    running: Arc<AtomicBool>,
    device_type: DeviceType,
    device_id: String,
    sink: SharedSink,
    stats: SharedStats,
    ready_tx: mpsc::SyncSender<Result<(), CaptureError>>,
) {
    let mut client = match CaptureClient::open(device_type, &device_id) {
        Ok(client) => client,
        Err(err) => {
            log::error!("wasapi session init failed: {err}");
            sink.on_error(&err);
            let _ = ready_tx.send(Err(err));
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    if let Err(err) = client.run(&running, &sink, &stats) {
        log::error!("wasapi capture loop failed: {err}");
        sink.on_error(&err);
    }
    running.store(false, Ordering::SeqCst);
}

/// Everything the producer thread owns for one session.
///
/// Field order matters: the COM guard is declared last so it drops after
/// the interfaces it scopes.
struct CaptureClient {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    layout: StreamLayout,
    event: HANDLE,
    _com: ComSession,
}

impl CaptureClient {
    /// Apartment, enumerator, endpoint, audio client, event binding, start.
    fn open(device_type: DeviceType, device_id: &str) -> Result<Self, CaptureError> {
        let com = ComSession::begin()?;
        let enumerator = EndpointEnumerator::new()?;
        let device = enumerator.resolve(device_type, device_id)?;

        unsafe {
            let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| {
                CaptureError::DeviceDisconnected(format!("Activate failed: {e}"))
            })?;

            let mix_format = audio_client.GetMixFormat().map_err(|e| {
                CaptureError::DeviceDisconnected(format!("GetMixFormat failed: {e}"))
            })?;
            let layout = parse_wave_format(&*mix_format);

            // Loopback reads from render endpoints; the stream still behaves
            // like a capture client.
            let mut stream_flags =
                AUDCLNT_STREAMFLAGS_EVENTCALLBACK | AUDCLNT_STREAMFLAGS_NOPERSIST;
            if device_type == DeviceType::Output {
                stream_flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
            }

            let init = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                stream_flags,
                BUFFER_DURATION_HNS,
                0,
                mix_format,
                None,
            );
            CoTaskMemFree(Some(mix_format as *const _ as *const _));
            init.map_err(|e| {
                CaptureError::DeviceDisconnected(format!("IAudioClient::Initialize failed: {e}"))
            })?;

            let event = CreateEventW(None, false, false, None).map_err(|e| {
                CaptureError::DeviceDisconnected(format!("CreateEventW failed: {e}"))
            })?;

            let capture_client: IAudioCaptureClient = match audio_client.GetService() {
                Ok(client) => client,
                Err(e) => {
                    let _ = CloseHandle(event);
                    return Err(CaptureError::DeviceDisconnected(format!(
                        "GetService failed: {e}"
                    )));
                }
            };

            // From here on, Drop covers Stop + CloseHandle on every path.
            let client = Self {
                audio_client,
                capture_client,
                layout,
                event,
                _com: com,
            };

            client.audio_client.SetEventHandle(client.event).map_err(|e| {
                CaptureError::DeviceDisconnected(format!("SetEventHandle failed: {e}"))
            })?;

            client.audio_client.Start().map_err(|e| {
                CaptureError::DeviceDisconnected(format!("IAudioClient::Start failed: {e}"))
            })?;

            Ok(client)
        }
    }

    /// Wait on the capture event and drain packets until stopped.
    fn run(
        &mut self,
        running: &AtomicBool,
        sink: &SharedSink,
        stats: &SharedStats,
    ) -> Result<(), CaptureError> {
        while running.load(Ordering::SeqCst) {
            let wait = unsafe { WaitForSingleObject(self.event, EVENT_WAIT_MS) };
            if wait == WAIT_TIMEOUT {
                continue;
            }
            if wait != WAIT_OBJECT_0 {
                return Err(CaptureError::DeviceDisconnected(
                    "wait on capture event failed".into(),
                ));
            }
            self.drain_packets(sink, stats)?;
        }
        Ok(())
    }

    /// Pull every queued packet, normalize, quantize, deliver.
    fn drain_packets(
        &mut self,
        sink: &SharedSink,
        stats: &SharedStats,
    ) -> Result<(), CaptureError> {
        unsafe {
            let mut packet_frames = self.capture_client.GetNextPacketSize().map_err(|e| {
                CaptureError::DeviceDisconnected(format!("GetNextPacketSize failed: {e}"))
            })?;

            while packet_frames > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                self.capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| {
                        CaptureError::DeviceDisconnected(format!("GetBuffer failed: {e}"))
                    })?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let frames = num_frames as usize;
                    let samples = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        vec![0.0f32; self.layout.samples_in(frames)]
                    } else {
                        let bytes = std::slice::from_raw_parts(
                            buffer_ptr,
                            frames * self.layout.block_align as usize,
                        );
                        decode_samples(bytes, self.layout.kind, self.layout.sample_stride())
                    };

                    let pcm = pcm16_bytes_from_f32(&samples);
                    if !pcm.is_empty() {
                        stats.record(pcm.len());
                        sink.on_data(&pcm);
                    }
                }

                self.capture_client.ReleaseBuffer(num_frames).map_err(|e| {
                    CaptureError::DeviceDisconnected(format!("ReleaseBuffer failed: {e}"))
                })?;

                packet_frames = self.capture_client.GetNextPacketSize().map_err(|e| {
                    CaptureError::DeviceDisconnected(format!("GetNextPacketSize failed: {e}"))
                })?;
            }
        }
        Ok(())
    }
}

impl Drop for CaptureClient {
    fn drop(&mut self) {
        unsafe {
            let _ = self.audio_client.Stop();
            if !self.event.is_invalid() {
                let _ = CloseHandle(self.event);
            }
        }
    }
}
