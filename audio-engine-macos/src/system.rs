//! System-audio capture via ScreenCaptureKit.
//!
//! A ScreenCaptureKit stream with `capturesAudio` enabled taps the global
//! render mix. Video is configured down to the minimum the API accepts
//! (2×2 surface at 1 fps, cursor off) and only audio sample buffers are
//! consumed. The stream emits 32-bit float audio, interleaved or planar;
//! both shapes quantize to the interleaved int16 output contract.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use block2::RcBlock;
use dispatch2::{DispatchQueue, DispatchRetained};
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2::{define_class, msg_send, AnyThread, DefinedClass, Message};
use objc2_core_audio_types::{
    kAudioFormatFlagIsFloat, kAudioFormatFlagIsNonInterleaved, kAudioFormatLinearPCM,
    AudioBufferList,
};
use objc2_core_foundation::{CFAllocator, CFRetained};
use objc2_core_media::{
    kCMSampleBufferFlag_AudioBufferList_Assure16ByteAlignment, CMAudioFormatDescription,
    CMAudioFormatDescriptionGetStreamBasicDescription, CMBlockBuffer, CMSampleBuffer, CMTime,
    CMTimeFlags,
};
use objc2_foundation::{
    NSArray, NSError, NSObject, NSObjectProtocol, NSOperatingSystemVersion, NSProcessInfo,
};
use objc2_screen_capture_kit::{
    SCContentFilter, SCShareableContent, SCStream, SCStreamConfiguration, SCStreamDelegate,
    SCStreamOutput, SCStreamOutputType,
};

use audio_engine_core::processing::interleave::interleave_planar_f32;
use audio_engine_core::processing::sample_convert::pcm16_bytes_from_f32;
use audio_engine_core::{CaptureError, SharedSink, SharedStats};

use crate::devices::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// First macOS release whose screen-capture subsystem carries audio.
const MIN_MAJOR_VERSION: isize = 13;

/// Bound on the stream start/stop completion handlers.
const STREAM_CALL_TIMEOUT: Duration = Duration::from_secs(10);

static QUEUE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Shared state the stream callbacks read.
struct TapState {
    sink: SharedSink,
    gate: Arc<AtomicBool>,
    stats: SharedStats,
    fatal_reported: AtomicBool,
}

define_class!(
    /// Receives audio sample buffers and stream lifecycle callbacks on the
    /// capture queue.
    #[unsafe(super(NSObject))]
    #[name = "AudioEngineSystemTap"]
    #[ivars = TapState]
    struct SystemTap;

    unsafe impl NSObjectProtocol for SystemTap {}

    unsafe impl SCStreamOutput for SystemTap {
        #[unsafe(method(stream:didOutputSampleBuffer:ofType:))]
        fn stream_did_output_sample_buffer(
            &self,
            _stream: &SCStream,
            sample_buffer: &CMSampleBuffer,
            kind: SCStreamOutputType,
        ) {
            if kind != SCStreamOutputType::Audio {
                return;
            }
            let state = self.ivars();
            if !state.gate.load(Ordering::SeqCst) {
                return;
            }
            if let Some(pcm) = pcm16_from_sample_buffer(sample_buffer) {
                if !pcm.is_empty() {
                    state.stats.record(pcm.len());
                    state.sink.on_data(&pcm);
                }
            }
        }
    }

    unsafe impl SCStreamDelegate for SystemTap {
        #[unsafe(method(stream:didStopWithError:))]
        fn stream_did_stop_with_error(&self, _stream: &SCStream, error: &NSError) {
            let state = self.ivars();
            state.gate.store(false, Ordering::SeqCst);
            if !state.fatal_reported.swap(true, Ordering::SeqCst) {
                let err =
                    CaptureError::DeviceDisconnected(error.localizedDescription().to_string());
                log::error!("system audio stream stopped: {err}");
                state.sink.on_error(&err);
            }
        }
    }
);

impl SystemTap {
    fn new(sink: SharedSink, gate: Arc<AtomicBool>, stats: SharedStats) -> Retained<Self> {
        let this = Self::alloc().set_ivars(TapState {
            sink,
            gate,
            stats,
            fatal_reported: AtomicBool::new(false),
        });
        unsafe { msg_send![super(this), init] }
    }
}

/// An active system-audio session.
pub struct SystemAudioCapture {
    stream: Retained<SCStream>,
    _tap: Retained<SystemTap>,
    _queue: DispatchRetained<DispatchQueue>,
    gate: Arc<AtomicBool>,
}

impl SystemAudioCapture {
    /// Build, configure and start the stream. Returns once the stream's
    /// start completion handler has fired.
    pub fn start(sink: SharedSink, stats: SharedStats) -> Result<Self, CaptureError> {
        if !os_supports_audio_capture() {
            return Err(CaptureError::UnsupportedOperation(format!(
                "system audio capture requires macOS {MIN_MAJOR_VERSION}.0 or newer"
            )));
        }

        let content = fetch_shareable_content(STREAM_CALL_TIMEOUT)?;
        let displays = unsafe { content.displays() };
        if displays.count() == 0 {
            return Err(CaptureError::DeviceDisconnected(
                "no display available for the capture stream".into(),
            ));
        }
        let display = displays.objectAtIndex(0);

        // Whole-display filter with no window exclusions: the full mix.
        let empty_windows = NSArray::new();
        let filter = unsafe {
            SCContentFilter::initWithDisplay_excludingWindows(
                SCContentFilter::alloc(),
                &display,
                &empty_windows,
            )
        };

        let config = unsafe { SCStreamConfiguration::new() };
        unsafe {
            config.setCapturesAudio(true);
            config.setSampleRate(OUTPUT_SAMPLE_RATE as isize);
            config.setChannelCount(OUTPUT_CHANNELS as isize);
            // Minimum video surface the API accepts; frames are discarded.
            config.setWidth(2);
            config.setHeight(2);
            config.setMinimumFrameInterval(CMTime {
                value: 1,
                timescale: 1,
                flags: CMTimeFlags::Valid,
                epoch: 0,
            });
            config.setShowsCursor(false);
        }

        let queue_label = format!(
            "audio-engine.system.{}",
            QUEUE_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let queue = DispatchQueue::new(&queue_label, None);

        let gate = Arc::new(AtomicBool::new(true));
        let tap = SystemTap::new(sink, Arc::clone(&gate), stats);

        let stream = unsafe {
            SCStream::initWithFilter_configuration_delegate(
                SCStream::alloc(),
                &filter,
                &config,
                Some(ProtocolObject::from_ref(&*tap)),
            )
        };

        unsafe {
            SCStream::addStreamOutput_type_sampleHandlerQueue_error(
                &stream,
                ProtocolObject::from_ref(&*tap),
                SCStreamOutputType::Audio,
                Some(&queue),
            )
        }
        .map_err(|e| {
            CaptureError::DeviceDisconnected(format!(
                "failed to add audio stream output: {}",
                e.localizedDescription()
            ))
        })?;

        let (start_tx, start_rx) = mpsc::channel::<Result<(), String>>();
        let completion = RcBlock::new(move |error: *mut NSError| {
            let result = if error.is_null() {
                Ok(())
            } else {
                Err(unsafe { &*error }.localizedDescription().to_string())
            };
            let _ = start_tx.send(result);
        });
        unsafe {
            stream.startCaptureWithCompletionHandler(Some(&completion));
        }

        match start_rx.recv_timeout(STREAM_CALL_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                stream,
                _tap: tap,
                _queue: queue,
                gate,
            }),
            Ok(Err(detail)) => Err(CaptureError::DeviceDisconnected(format!(
                "failed to start capture stream: {detail}"
            ))),
            Err(_) => Err(CaptureError::DeviceDisconnected(
                "capture stream start did not complete".into(),
            )),
        }
    }

    pub fn is_running(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    /// Stop the stream and wait for the stop completion handler, so no
    /// callback fires after this returns.
    pub fn stop(&mut self) {
        self.gate.store(false, Ordering::SeqCst);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let completion = RcBlock::new(move |_error: *mut NSError| {
            let _ = stop_tx.send(());
        });
        unsafe {
            self.stream.stopCaptureWithCompletionHandler(Some(&completion));
        }
        if stop_rx.recv_timeout(STREAM_CALL_TIMEOUT).is_err() {
            log::warn!("capture stream stop did not complete in time");
        }
    }
}

// SAFETY: the retained stream objects are only used from the thread that
// owns the engine; the delegate runs on the capture queue but touches only
// the Send + Sync tap state.
unsafe impl Send for SystemAudioCapture {}

fn os_supports_audio_capture() -> bool {
    let version = NSOperatingSystemVersion {
        majorVersion: MIN_MAJOR_VERSION,
        minorVersion: 0,
        patchVersion: 0,
    };
    NSProcessInfo::processInfo().isOperatingSystemAtLeastVersion(version)
}

/// Retained wrapper that may cross the completion-handler thread boundary.
struct SendRetained<T: Message>(Retained<T>);
// SAFETY: the wrapped object is handed over exactly once and never used
// concurrently from both sides.
unsafe impl<T: Message> Send for SendRetained<T> {}

/// Fetch the shareable-content snapshot, blocking up to `timeout`.
///
/// Failure means the process lacks the screen/system-audio recording
/// grant; the same call is also how the grant is requested (the OS raises
/// its dialog on the first denied attempt).
pub(crate) fn fetch_shareable_content(
    timeout: Duration,
) -> Result<Retained<SCShareableContent>, CaptureError> {
    let (tx, rx) = mpsc::channel::<Result<SendRetained<SCShareableContent>, String>>();
    let handler = RcBlock::new(
        move |content: *mut SCShareableContent, error: *mut NSError| {
            let result = if !error.is_null() {
                Err(unsafe { &*error }.localizedDescription().to_string())
            } else if !content.is_null() {
                Ok(SendRetained(unsafe { &*content }.retain()))
            } else {
                Err("no shareable content returned".into())
            };
            let _ = tx.send(result);
        },
    );
    unsafe { SCShareableContent::getShareableContentWithCompletionHandler(&handler) };

    match rx.recv_timeout(timeout) {
        Ok(Ok(content)) => Ok(content.0),
        Ok(Err(detail)) => {
            log::debug!("shareable content fetch refused: {detail}");
            Err(CaptureError::PermissionDenied)
        }
        Err(_) => Err(CaptureError::PermissionDenied),
    }
}

/// Quantize one audio sample buffer to interleaved int16 bytes.
///
/// Interleaved float32 converts in place; planar float32 interleaves
/// `(frame, channel)` from the per-channel planes. Anything that is not
/// linear-PCM float32 is dropped (`None`) while the stream keeps running.
fn pcm16_from_sample_buffer(sample_buffer: &CMSampleBuffer) -> Option<Vec<u8>> {
    let format_description = unsafe { sample_buffer.format_description() }?;
    let audio_description = CFRetained::as_ptr(&format_description).as_ptr()
        as *const CMAudioFormatDescription;
    let asbd =
        unsafe { CMAudioFormatDescriptionGetStreamBasicDescription(&*audio_description) };
    let asbd = unsafe { asbd.as_ref() }?;

    if asbd.mFormatID != kAudioFormatLinearPCM
        || (asbd.mFormatFlags & kAudioFormatFlagIsFloat) == 0
        || asbd.mBitsPerChannel != 32
    {
        return None;
    }
    let channels = asbd.mChannelsPerFrame as usize;
    if channels == 0 {
        return None;
    }
    let planar = (asbd.mFormatFlags & kAudioFormatFlagIsNonInterleaved) != 0;

    let (storage, _block) = copy_audio_buffer_list(sample_buffer)?;
    let buffer_list = storage.as_ptr() as *const AudioBufferList;
    let buffers = unsafe {
        std::slice::from_raw_parts(
            (*buffer_list).mBuffers.as_ptr(),
            (*buffer_list).mNumberBuffers as usize,
        )
    };
    if buffers.is_empty() {
        return None;
    }

    if planar {
        if buffers.len() < channels {
            return None;
        }
        let frames = buffers[0].mDataByteSize as usize / 4;
        let mut planes: Vec<&[f32]> = Vec::with_capacity(channels);
        for buffer in buffers.iter().take(channels) {
            if buffer.mData.is_null() {
                return None;
            }
            let plane_frames = (buffer.mDataByteSize as usize / 4).min(frames);
            planes
                .push(unsafe { std::slice::from_raw_parts(buffer.mData as *const f32, plane_frames) });
        }
        Some(interleave_planar_f32(&planes, frames))
    } else {
        let buffer = &buffers[0];
        if buffer.mData.is_null() {
            return None;
        }
        let samples = buffer.mDataByteSize as usize / 4;
        let whole = samples - samples % channels;
        let data = unsafe { std::slice::from_raw_parts(buffer.mData as *const f32, whole) };
        Some(pcm16_bytes_from_f32(data))
    }
}

/// Copy the sample buffer's audio buffer list out, retaining the backing
/// block buffer so the plane pointers stay valid while in use.
pub(crate) fn copy_audio_buffer_list(
    sample_buffer: &CMSampleBuffer,
) -> Option<(Vec<u8>, Option<CFRetained<CMBlockBuffer>>)> {
    let flags = kCMSampleBufferFlag_AudioBufferList_Assure16ByteAlignment;
    let mut list_size: usize = 0;
    let mut block_buffer: *mut CMBlockBuffer = std::ptr::null_mut();

    let status = unsafe {
        sample_buffer.audio_buffer_list_with_retained_block_buffer(
            &mut list_size,
            std::ptr::null_mut(),
            0,
            None::<&CFAllocator>,
            None::<&CFAllocator>,
            flags,
            &mut block_buffer,
        )
    };
    if status != 0 || list_size == 0 {
        return None;
    }

    let mut storage = vec![0u8; list_size];
    let status = unsafe {
        sample_buffer.audio_buffer_list_with_retained_block_buffer(
            &mut list_size,
            storage.as_mut_ptr() as *mut AudioBufferList,
            list_size,
            None::<&CFAllocator>,
            None::<&CFAllocator>,
            flags,
            &mut block_buffer,
        )
    };
    if status != 0 {
        return None;
    }

    let block = std::ptr::NonNull::new(block_buffer)
        .map(|ptr| unsafe { CFRetained::from_raw(ptr) });
    Some((storage, block))
}
