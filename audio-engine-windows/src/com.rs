use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use audio_engine_core::CaptureError;

/// RAII scope for COM apartment membership on the current thread.
///
/// Every entry point that touches MMDevice interfaces initializes the
/// multithreaded apartment and uninitializes it on drop; nested entries are
/// balanced by COM's own reference counting.
pub(crate) struct ComSession;

impl ComSession {
    pub fn begin() -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| {
                    CaptureError::DeviceDisconnected(format!("CoInitializeEx failed: {e}"))
                })?;
        }
        Ok(Self)
    }
}

impl Drop for ComSession {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
