//! Microphone capture via AVFoundation.
//!
//! One `AVCaptureSession` per session: a device input resolved by unique
//! id feeds an audio data output whose settings ask the OS for linear PCM,
//! 48 kHz, 2 channels, 16-bit signed little-endian interleaved — the
//! conversion from the hardware format happens inside the capture stack.
//! The sample-buffer delegate runs on a uniquely-named serial queue and
//! forwards the raw bytes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dispatch2::{DispatchQueue, DispatchRetained};
use objc2::rc::Retained;
use objc2::runtime::{AnyObject, Bool, ProtocolObject};
use objc2::{class, define_class, msg_send, AnyThread, DefinedClass};
use objc2_av_foundation::{
    AVCaptureAudioDataOutput, AVCaptureAudioDataOutputSampleBufferDelegate, AVCaptureConnection,
    AVCaptureDeviceInput, AVCaptureOutput, AVCaptureSession, AVFormatIDKey,
    AVLinearPCMBitDepthKey, AVLinearPCMIsBigEndianKey, AVLinearPCMIsFloatKey,
    AVLinearPCMIsNonInterleaved, AVNumberOfChannelsKey, AVSampleRateKey,
};
use objc2_core_audio_types::kAudioFormatLinearPCM;
use objc2_core_media::CMSampleBuffer;
use objc2_foundation::{NSDictionary, NSObject, NSObjectProtocol, NSString};

use audio_engine_core::{CaptureError, SharedSink, SharedStats};

use crate::devices::{input_device_by_id, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::permissions;
use crate::system::copy_audio_buffer_list;

static QUEUE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// State shared with the data-output delegate.
struct TapState {
    sink: SharedSink,
    gate: Arc<AtomicBool>,
    stats: SharedStats,
}

define_class!(
    /// Sample-buffer delegate: pulls the already-converted int16 bytes out
    /// of each buffer and forwards them.
    #[unsafe(super(NSObject))]
    #[name = "AudioEngineMicTap"]
    #[ivars = TapState]
    struct MicTap;

    unsafe impl NSObjectProtocol for MicTap {}

    unsafe impl AVCaptureAudioDataOutputSampleBufferDelegate for MicTap {
        #[unsafe(method(captureOutput:didOutputSampleBuffer:fromConnection:))]
        fn capture_output_did_output_sample_buffer(
            &self,
            _output: &AVCaptureOutput,
            sample_buffer: &CMSampleBuffer,
            _connection: &AVCaptureConnection,
        ) {
            let state = self.ivars();
            if !state.gate.load(Ordering::SeqCst) {
                return;
            }
            if let Some(pcm) = interleaved_bytes(sample_buffer) {
                if !pcm.is_empty() {
                    state.stats.record(pcm.len());
                    state.sink.on_data(&pcm);
                }
            }
        }
    }
);

impl MicTap {
    fn new(sink: SharedSink, gate: Arc<AtomicBool>, stats: SharedStats) -> Retained<Self> {
        let this = Self::alloc().set_ivars(TapState { sink, gate, stats });
        unsafe { msg_send![super(this), init] }
    }
}

/// An active microphone session.
pub struct MicCapture {
    session: Retained<AVCaptureSession>,
    _tap: Retained<MicTap>,
    _queue: DispatchRetained<DispatchQueue>,
    gate: Arc<AtomicBool>,
}

impl MicCapture {
    /// Resolve the device, wire input → output, and start the session.
    pub fn start(
        device_id: &str,
        sink: SharedSink,
        stats: SharedStats,
    ) -> Result<Self, CaptureError> {
        if !permissions::mic_granted() {
            return Err(CaptureError::PermissionDenied);
        }

        let device = input_device_by_id(device_id)
            .ok_or_else(|| CaptureError::DeviceNotFound(device_id.into()))?;

        let gate = Arc::new(AtomicBool::new(true));
        let tap = MicTap::new(sink, Arc::clone(&gate), stats);

        let queue_label = format!(
            "audio-engine.mic.{}",
            QUEUE_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let queue = DispatchQueue::new(&queue_label, None);

        unsafe {
            let input = AVCaptureDeviceInput::deviceInputWithDevice_error(&device).map_err(
                |error| {
                    CaptureError::DeviceDisconnected(format!(
                        "failed to open device input: {}",
                        error.localizedDescription()
                    ))
                },
            )?;

            let session = AVCaptureSession::new();
            session.beginConfiguration();

            if !session.canAddInput(&input) {
                session.commitConfiguration();
                return Err(CaptureError::DeviceDisconnected(
                    "capture session rejected the device input".into(),
                ));
            }
            session.addInput(&input);

            let output = AVCaptureAudioDataOutput::new();
            output.setAudioSettings(Some(&pcm16_output_settings()));
            output.setSampleBufferDelegate_queue(
                Some(ProtocolObject::from_ref(&*tap)),
                Some(&queue),
            );

            if !session.canAddOutput(&output) {
                session.commitConfiguration();
                return Err(CaptureError::DeviceDisconnected(
                    "capture session rejected the audio data output".into(),
                ));
            }
            session.addOutput(&output);
            session.commitConfiguration();

            // Blocks until the session graph is running.
            session.startRunning();

            Ok(Self {
                session,
                _tap: tap,
                _queue: queue,
                gate,
            })
        }
    }

    pub fn is_running(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    /// Tear the session down synchronously; the delivery gate is cleared
    /// first so nothing queued behind `stopRunning` reaches the sink.
    pub fn stop(&mut self) {
        self.gate.store(false, Ordering::SeqCst);
        unsafe {
            self.session.stopRunning();
        }
    }
}

// SAFETY: the retained session objects are only used from the thread that
// owns the engine; the delegate runs on the capture queue but touches only
// the Send + Sync tap state.
unsafe impl Send for MicCapture {}

/// Output settings dictionary: linear PCM, 48 kHz, stereo, s16le,
/// interleaved.
fn pcm16_output_settings() -> Retained<NSDictionary<NSString, AnyObject>> {
    let format_id = ns_number_u32(kAudioFormatLinearPCM);
    let sample_rate = ns_number_f64(OUTPUT_SAMPLE_RATE as f64);
    let channels = ns_number_u32(OUTPUT_CHANNELS as u32);
    let bit_depth = ns_number_u32(16);
    let no = ns_number_bool(false);

    unsafe {
        let keys: [&NSString; 7] = [
            AVFormatIDKey,
            AVSampleRateKey,
            AVNumberOfChannelsKey,
            AVLinearPCMBitDepthKey,
            AVLinearPCMIsFloatKey,
            AVLinearPCMIsBigEndianKey,
            AVLinearPCMIsNonInterleaved,
        ];
        let values: [&AnyObject; 7] = [
            &format_id, &sample_rate, &channels, &bit_depth, &no, &no, &no,
        ];
        NSDictionary::from_slices(&keys, &values)
    }
}

fn ns_number_u32(value: u32) -> Retained<AnyObject> {
    unsafe { msg_send![class!(NSNumber), numberWithUnsignedInt: value] }
}

fn ns_number_f64(value: f64) -> Retained<AnyObject> {
    unsafe { msg_send![class!(NSNumber), numberWithDouble: value] }
}

fn ns_number_bool(value: bool) -> Retained<AnyObject> {
    unsafe { msg_send![class!(NSNumber), numberWithBool: Bool::new(value)] }
}

/// The buffers already hold interleaved s16le frames (the output settings
/// asked for them); copy the payload, trimmed to whole frames.
fn interleaved_bytes(sample_buffer: &CMSampleBuffer) -> Option<Vec<u8>> {
    let (storage, _block) = copy_audio_buffer_list(sample_buffer)?;
    let buffer_list = storage.as_ptr() as *const objc2_core_audio_types::AudioBufferList;
    let buffers = unsafe {
        std::slice::from_raw_parts(
            (*buffer_list).mBuffers.as_ptr(),
            (*buffer_list).mNumberBuffers as usize,
        )
    };
    let buffer = buffers.first()?;
    if buffer.mData.is_null() {
        return None;
    }

    let frame_bytes = 2 * OUTPUT_CHANNELS as usize;
    let len = buffer.mDataByteSize as usize;
    let whole = len - len % frame_bytes;
    let data = unsafe { std::slice::from_raw_parts(buffer.mData as *const u8, whole) };
    Some(data.to_vec())
}
