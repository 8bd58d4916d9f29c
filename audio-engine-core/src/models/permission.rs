use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a blocking permission request waits for the user before giving
/// up and reporting the permission as denied.
pub const PERMISSION_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot of the process's capture permissions.
///
/// Queried on demand; the status may change between calls (the user can
/// flip it in system settings at any time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub mic: bool,
    pub system: bool,
}

impl PermissionStatus {
    /// Status on platforms without permission gates.
    pub fn granted() -> Self {
        Self {
            mic: true,
            system: true,
        }
    }
}

/// The capture permission being queried or requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Mic,
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granted_covers_both_gates() {
        let status = PermissionStatus::granted();
        assert!(status.mic);
        assert!(status.system);
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PermissionKind::Mic).unwrap(), "\"mic\"");
        assert_eq!(serde_json::to_string(&PermissionKind::System).unwrap(), "\"system\"");
    }
}
