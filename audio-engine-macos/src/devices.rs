//! macOS device enumeration.
//!
//! Microphones are addressed by their AVFoundation unique ids. Rendered
//! output has no per-device capture path here (ScreenCaptureKit taps the
//! global mix), so enumeration collapses every render endpoint into the
//! single reserved `"system"` output device.

use objc2::rc::Retained;
use objc2::{msg_send, ClassType};
use objc2_av_foundation::{AVCaptureDevice, AVMediaTypeAudio};
use objc2_core_media::CMAudioFormatDescriptionGetStreamBasicDescription;
use objc2_foundation::{NSArray, NSString};

use audio_engine_core::{CaptureError, Device, DeviceFormat, DeviceType, SYSTEM_DEVICE_ID};

/// Output rate forced on both macOS capture paths.
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;
/// Channel count forced on both macOS capture paths.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Every device the engine can capture from: all audio-media input devices
/// plus the virtual system-audio output.
pub fn list_devices() -> Vec<Device> {
    let mut devices = input_devices();
    devices.push(system_output_device());
    devices
}

/// All audio-media capture devices (built-in and external microphones).
pub fn input_devices() -> Vec<Device> {
    unsafe {
        let media = AVMediaTypeAudio;
        let default: Option<Retained<AVCaptureDevice>> =
            msg_send![AVCaptureDevice::class(), defaultDeviceWithMediaType: media];
        let default_id = default.map(|d| d.uniqueID().to_string());
        let all: Retained<NSArray<AVCaptureDevice>> =
            msg_send![AVCaptureDevice::class(), devicesWithMediaType: media];

        let mut devices = Vec::with_capacity(all.count());
        for device in all.iter() {
            let id = device.uniqueID().to_string();
            if id.is_empty() {
                continue;
            }
            devices.push(Device {
                is_default: default_id.as_deref() == Some(id.as_str()),
                name: device.localizedName().to_string(),
                device_type: DeviceType::Input,
                id,
            });
        }
        devices
    }
}

/// The one reserved output device.
pub fn system_output_device() -> Device {
    Device {
        id: SYSTEM_DEVICE_ID.into(),
        name: "System Audio".into(),
        device_type: DeviceType::Output,
        is_default: true,
    }
}

/// Resolve an input device by its unique id.
pub fn input_device_by_id(id: &str) -> Option<Retained<AVCaptureDevice>> {
    let ns_id = NSString::from_str(id);
    unsafe { msg_send![AVCaptureDevice::class(), deviceWithUniqueID: &*ns_id] }
}

/// Whether `id` names a known input device.
pub fn is_input_device(id: &str) -> bool {
    input_device_by_id(id).is_some()
}

/// Stream format of a device.
///
/// The reserved system id reports the fixed ScreenCaptureKit contract
/// `(48000, 2, 16, 32)`; microphones report their active format with the
/// native width in `raw_bit_depth`.
pub fn device_format(id: &str) -> Result<DeviceFormat, CaptureError> {
    if id == SYSTEM_DEVICE_ID {
        // Fixed ScreenCaptureKit contract: float32 engine quantized to 16-bit.
        return Ok(DeviceFormat::with_native(
            OUTPUT_SAMPLE_RATE,
            OUTPUT_CHANNELS,
            32,
        ));
    }

    let device = input_device_by_id(id).ok_or_else(|| CaptureError::DeviceNotFound(id.into()))?;

    unsafe {
        let format = device.activeFormat();
        let description = format.formatDescription();
        let audio_description = objc2_core_foundation::CFRetained::as_ptr(&description).as_ptr()
            as *const objc2_core_media::CMAudioFormatDescription;
        let asbd = CMAudioFormatDescriptionGetStreamBasicDescription(&*audio_description);
        let asbd = asbd.as_ref().ok_or_else(|| {
            CaptureError::DeviceDisconnected(format!(
                "device `{id}` has no stream description"
            ))
        })?;

        let raw_bits = if asbd.mBitsPerChannel > 0 {
            asbd.mBitsPerChannel as u16
        } else {
            32
        };
        Ok(DeviceFormat::with_native(
            asbd.mSampleRate as u32,
            asbd.mChannelsPerFrame as u16,
            raw_bits,
        ))
    }
}
