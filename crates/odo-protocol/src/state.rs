//! Device state payload.
//!
//! Every adapter publishes the same base shape (`{"status": ...}`) extended
//! with its own details, flattened into one JSON object:
//!
//! ```
//! use odo_core::DeviceStatus;
//! use odo_protocol::DeviceState;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct RouterDetails {
//!     mode: &'static str,
//! }
//!
//! let state = DeviceState::new(DeviceStatus::Connected, RouterDetails { mode: "seen" });
//! let json = serde_json::to_string(&state).unwrap();
//! assert_eq!(json, r#"{"status":"connected","mode":"seen"}"#);
//! ```

use odo_core::DeviceStatus;
use serde::{Deserialize, Serialize};

/// Adapter state: connectivity plus adapter specific details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState<D> {
    pub status: DeviceStatus,
    #[serde(flatten)]
    pub details: D,
}

impl<D> DeviceState<D> {
    pub fn new(status: DeviceStatus, details: D) -> Self {
        Self { status, details }
    }
}

impl<D: Default> Default for DeviceState<D> {
    fn default() -> Self {
        Self::new(DeviceStatus::Disconnected, D::default())
    }
}

/// Details of an adapter that reports nothing beyond its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoDetails {}
