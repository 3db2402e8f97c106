use thiserror::Error;

/// Errors that can occur during bus operations
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker could not be reached
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    /// Broker refused the session
    #[error("Broker rejected connection: {0}")]
    Rejected(String),

    /// Operation needs a session and there is none
    #[error("Not connected to broker")]
    NotConnected,

    /// Session dropped while in use
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

impl From<BusError> for odo_core::Error {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Rejected(reason) => odo_core::Error::Connection(reason),
            other => odo_core::Error::Transport(other.to_string()),
        }
    }
}
