//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active capture (microphone) and
//! render (speaker/headphone) endpoints with friendly names and per-direction
//! default flags, and to resolve endpoints by id for session startup.

use windows::core::PCWSTR;
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eCapture, eConsole, eRender, EDataFlow, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator,
    DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::StructuredStorage::PropVariantToStringAlloc;
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, STGM_READ};
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

use audio_engine_core::{CaptureError, Device, DeviceType};

fn flow_of(device_type: DeviceType) -> EDataFlow {
    match device_type {
        DeviceType::Input => eCapture,
        DeviceType::Output => eRender,
    }
}

/// Audio endpoint enumerator.
///
/// Requires COM to be initialized on the calling thread; every public
/// engine entry point scopes its calls with a `ComSession` guard.
pub struct EndpointEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl EndpointEnumerator {
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|e| {
                    CaptureError::DeviceDisconnected(format!("failed to create enumerator: {e}"))
                })?;
            Ok(Self { enumerator })
        }
    }

    /// Snapshot of all active endpoints, both directions.
    pub fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        let mut devices = self.list_direction(DeviceType::Input)?;
        devices.extend(self.list_direction(DeviceType::Output)?);
        Ok(devices)
    }

    /// Resolve `(device_type, id)` to an endpoint of the right direction.
    ///
    /// An id that only exists in the opposite direction is a
    /// `DEVICE_TYPE_MISMATCH`; an id in neither is `DEVICE_NOT_FOUND`.
    pub fn resolve(&self, device_type: DeviceType, id: &str) -> Result<IMMDevice, CaptureError> {
        if let Some(device) = self.find_in_direction(device_type, id)? {
            return Ok(device);
        }
        let opposite = match device_type {
            DeviceType::Input => DeviceType::Output,
            DeviceType::Output => DeviceType::Input,
        };
        if self.find_in_direction(opposite, id)?.is_some() {
            return Err(CaptureError::DeviceTypeMismatch {
                id: id.into(),
                expected: device_type,
            });
        }
        Err(CaptureError::DeviceNotFound(id.into()))
    }

    /// Resolve an endpoint by id alone (direction not checked).
    pub fn device_by_id(&self, id: &str) -> Result<IMMDevice, CaptureError> {
        let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            self.enumerator
                .GetDevice(PCWSTR(wide.as_ptr()))
                .map_err(|_| CaptureError::DeviceNotFound(id.into()))
        }
    }

    fn default_id(&self, flow: EDataFlow) -> Option<String> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(flow, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok())
        }
    }

    fn list_direction(&self, device_type: DeviceType) -> Result<Vec<Device>, CaptureError> {
        let flow = flow_of(device_type);
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| {
                    CaptureError::DeviceDisconnected(format!("EnumAudioEndpoints failed: {e}"))
                })?;
            let count = collection.GetCount().map_err(|e| {
                CaptureError::DeviceDisconnected(format!("GetCount failed: {e}"))
            })?;

            let default_id = self.default_id(flow);
            let mut devices = Vec::with_capacity(count as usize);

            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };
                let id = match device.GetId() {
                    Ok(id) => match id.to_string() {
                        Ok(s) if !s.is_empty() => s,
                        _ => continue,
                    },
                    Err(_) => continue,
                };
                let name =
                    Self::friendly_name(&device).unwrap_or_else(|| format!("Device {i}"));
                let is_default = default_id.as_deref() == Some(&id);

                devices.push(Device {
                    id,
                    name,
                    device_type,
                    is_default,
                });
            }

            Ok(devices)
        }
    }

    fn find_in_direction(
        &self,
        device_type: DeviceType,
        id: &str,
    ) -> Result<Option<IMMDevice>, CaptureError> {
        let flow = flow_of(device_type);
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| {
                    CaptureError::DeviceDisconnected(format!("EnumAudioEndpoints failed: {e}"))
                })?;
            let count = collection.GetCount().map_err(|e| {
                CaptureError::DeviceDisconnected(format!("GetCount failed: {e}"))
            })?;

            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };
                let candidate = device
                    .GetId()
                    .ok()
                    .and_then(|s| s.to_string().ok())
                    .unwrap_or_default();
                if candidate == id {
                    return Ok(Some(device));
                }
            }
        }
        Ok(None)
    }

    /// Read PKEY_Device_FriendlyName from the endpoint's property store.
    fn friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store: IPropertyStore = device.OpenPropertyStore(STGM_READ).ok()?;
            let prop = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
            let pwstr = PropVariantToStringAlloc(&prop).ok()?;
            let name = pwstr.to_string().ok();
            CoTaskMemFree(Some(pwstr.0 as *const _));
            name
        }
    }
}
