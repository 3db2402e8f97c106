//! Error types for hardware operations.
//!
//! Every collaborator in this crate (credential source, command driver,
//! haptic link) reports failures with [`HardwareError`]. The conversion into
//! [`odo_core::Error`] decides how the adapter supervisor treats each one:
//!
//! | Variant | Becomes | Supervisor |
//! |---------|---------|------------|
//! | `Unreachable`, `Disconnected`, `CommunicationError` | `Transport` | reconnect on backoff |
//! | `InvalidData` | `Parse` | log and skip |
//! | `Timeout` | `HardwareTimeout` | stop |
//! | `StreamClosed` | `StreamClosed` | stop |
//! | `InitializationFailed` | `Connection` | stop |
//! | `Io` | `Io` | stop |

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Resource could not be reached (network down, device absent, bad status).
    #[error("Device unreachable: {message}")]
    Unreachable { message: String },

    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Device output ended unexpectedly.
    #[error("Stream closed: {device}")]
    StreamClosed { device: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new stream closed error.
    pub fn stream_closed(device: impl Into<String>) -> Self {
        Self::StreamClosed {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }
}

impl From<HardwareError> for odo_core::Error {
    fn from(error: HardwareError) -> Self {
        match error {
            HardwareError::Unreachable { .. }
            | HardwareError::Disconnected { .. }
            | HardwareError::CommunicationError { .. } => {
                odo_core::Error::Transport(error.to_string())
            }
            HardwareError::InvalidData { message } => odo_core::Error::Parse(message),
            HardwareError::Timeout { duration_ms } => {
                odo_core::Error::HardwareTimeout { duration_ms }
            }
            HardwareError::StreamClosed { device } => odo_core::Error::StreamClosed(device),
            HardwareError::InitializationFailed { message } => odo_core::Error::Connection(message),
            HardwareError::Io(e) => odo_core::Error::Io(e),
        }
    }
}
