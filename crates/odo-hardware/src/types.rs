//! Common types returned by device handshakes.

use serde::{Deserialize, Serialize};

/// Identity reported by a credential source's version handshake.
///
/// Field names follow the source firmware's JSON (`{"version": ..., "ChipID": ...}`).
/// Unknown fields are ignored and missing ones stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Firmware version string.
    #[serde(default)]
    pub version: Option<String>,

    /// Chip identifier of the source board.
    #[serde(default, rename = "ChipID")]
    pub chip_id: Option<String>,
}

impl SourceInfo {
    /// Create a SourceInfo with both fields set.
    pub fn new(version: impl Into<String>, chip_id: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            chip_id: Some(chip_id.into()),
        }
    }
}

/// Identity reported by a haptic actuator's handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HapticInfo {
    /// Device type code (e.g., `"C"`).
    pub device_type: String,

    /// Firmware version.
    pub version: String,

    /// Hardware address.
    pub mac_addr: String,

    /// Production batch.
    pub batch: Option<String>,
}
