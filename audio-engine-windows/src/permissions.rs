//! Windows permission gating.
//!
//! Neither WASAPI capture endpoints nor loopback on render endpoints sit
//! behind a consent gate for desktop processes, so queries always grant and
//! requests return immediately.

use audio_engine_core::{PermissionKind, PermissionStatus};

/// Non-prompting permission query: always `(true, true)`.
pub fn check() -> PermissionStatus {
    PermissionStatus::granted()
}

/// Permission request: nothing to prompt, immediately granted.
pub fn request(kind: PermissionKind) -> bool {
    log::debug!("permission request for {kind:?} on windows: granted");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_granted() {
        assert_eq!(check(), PermissionStatus::granted());
        assert!(request(PermissionKind::Mic));
        assert!(request(PermissionKind::System));
        // Idempotent by construction.
        assert!(request(PermissionKind::Mic));
    }
}
