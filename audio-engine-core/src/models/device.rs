use serde::{Deserialize, Serialize};

/// Direction of an audio device.
///
/// `Input` endpoints are capture sources (microphones); `Output` endpoints
/// render audio and can be captured in loopback / system-audio mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Input,
    Output,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reserved id of the virtual system-audio output device on macOS.
///
/// Enumeration on macOS collapses all render endpoints into a single entry
/// with this id; `(Output, "system")` is the only valid output selector there.
pub const SYSTEM_DEVICE_ID: &str = "system";

/// An audio device available for capture.
///
/// Snapshot only — enumeration does not keep platform handles alive.
/// `(device_type, id)` is the authoritative selector passed to `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub is_default: bool,
}

/// PCM bit depth of every buffer delivered to the data callback.
pub const OUTPUT_BIT_DEPTH: u16 = 16;

/// Stream format of a device.
///
/// `bit_depth` is always 16 — the engine quantizes to signed 16-bit
/// little-endian regardless of the native width, which is reported in
/// `raw_bit_depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub raw_bit_depth: u16,
}

impl DeviceFormat {
    /// Format for a device with the given native rate, channel count and
    /// native sample width.
    pub fn with_native(sample_rate: u32, channels: u16, raw_bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: OUTPUT_BIT_DEPTH,
            raw_bit_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DeviceType::Input).unwrap(), "\"input\"");
        assert_eq!(serde_json::to_string(&DeviceType::Output).unwrap(), "\"output\"");
    }

    #[test]
    fn device_wire_shape() {
        let device = Device {
            id: "m1".into(),
            name: "Mic".into(),
            device_type: DeviceType::Input,
            is_default: true,
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["type"], "input");
        assert_eq!(json["isDefault"], true);
    }

    #[test]
    fn format_fixes_output_depth() {
        let format = DeviceFormat::with_native(44100, 2, 24);
        assert_eq!(format.bit_depth, 16);
        assert_eq!(format.raw_bit_depth, 24);

        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["sampleRate"], 44100);
        assert_eq!(json["rawBitDepth"], 24);
    }
}
