//! TCC permission gating.
//!
//! Microphone consent goes through the AVFoundation authorization API.
//! Screen/system-audio recording has no query API; granted status is probed
//! by fetching shareable content, and requesting it is the same call — the
//! first attempt after a denial raises the system dialog.

use std::sync::mpsc;

use block2::RcBlock;
use objc2::runtime::Bool;
use objc2_av_foundation::{AVAuthorizationStatus, AVCaptureDevice, AVMediaTypeAudio};

use audio_engine_core::{PermissionKind, PermissionStatus, PERMISSION_REQUEST_TIMEOUT};

use crate::system::fetch_shareable_content;

/// Non-prompting query of both gates.
pub fn check() -> PermissionStatus {
    PermissionStatus {
        mic: mic_granted(),
        system: system_granted(),
    }
}

/// Blocking permission request, bounded by the 30-second timeout.
pub fn request(kind: PermissionKind) -> bool {
    match kind {
        PermissionKind::Mic => request_mic(),
        PermissionKind::System => system_granted(),
    }
}

/// Whether microphone access is currently authorized.
pub fn mic_granted() -> bool {
    let status = unsafe {
        AVCaptureDevice::authorizationStatusForMediaType(AVMediaTypeAudio)
    };
    status == AVAuthorizationStatus::Authorized
}

/// Whether screen/system-audio recording is currently granted.
///
/// Probe: shareable content is only returned to processes holding the TCC
/// grant.
pub fn system_granted() -> bool {
    fetch_shareable_content(PERMISSION_REQUEST_TIMEOUT).is_ok()
}

/// Request microphone consent.
///
/// Already-decided statuses return without prompting, which also makes the
/// call idempotent once granted. An undetermined status raises the consent
/// dialog and blocks until the user answers or the timeout elapses.
fn request_mic() -> bool {
    let status = unsafe {
        AVCaptureDevice::authorizationStatusForMediaType(AVMediaTypeAudio)
    };
    match status {
        AVAuthorizationStatus::Authorized => true,
        AVAuthorizationStatus::Denied | AVAuthorizationStatus::Restricted => false,
        _ => {
            let (tx, rx) = mpsc::channel();
            let handler = RcBlock::new(move |granted: Bool| {
                let _ = tx.send(granted.as_bool());
            });
            unsafe {
                AVCaptureDevice::requestAccessForMediaType_completionHandler(
                    AVMediaTypeAudio,
                    &handler,
                );
            }
            rx.recv_timeout(PERMISSION_REQUEST_TIMEOUT).unwrap_or(false)
        }
    }
}
