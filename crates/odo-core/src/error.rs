use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Reachability errors (retried on the fixed backoff)
    #[error("Transport error: {0}")]
    Transport(String),

    // Malformed input (logged and skipped)
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    // Rejected commands (state unchanged)
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Command driver failures (fatal to the adapter)
    #[error("Hardware timeout after {duration_ms}ms")]
    HardwareTimeout { duration_ms: u64 },

    #[error("Unexpected end of stream: {0}")]
    StreamClosed(String),

    // Bus handshake rejected (fatal to the adapter)
    #[error("Connection rejected: {0}")]
    Connection(String),

    // Resource could not be reached and retry is disabled
    #[error("Giving up on {resource}: {reason}")]
    RetryDisabled { resource: String, reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Adapter task panicked: {0}")]
    Panic(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the adapter must stop when it sees this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::HardwareTimeout { .. }
                | Error::StreamClosed(_)
                | Error::Connection(_)
                | Error::RetryDisabled { .. }
                | Error::InvalidStateTransition { .. }
                | Error::Panic(_)
                | Error::Io(_)
        )
    }

    /// Returns `true` if the operation should be retried after the backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::Transport("broker down".into()), false, true)]
    #[case(Error::Parse("bad line".into()), false, false)]
    #[case(Error::Configuration("mode".into()), false, false)]
    #[case(Error::HardwareTimeout { duration_ms: 10_000 }, true, false)]
    #[case(Error::StreamClosed("pm3".into()), true, false)]
    #[case(Error::Connection("refused".into()), true, false)]
    fn test_classification(#[case] error: Error, #[case] fatal: bool, #[case] retry: bool) {
        assert_eq!(error.is_fatal(), fatal);
        assert_eq!(error.is_retryable(), retry);
    }

    #[test]
    fn test_display() {
        let error = Error::HardwareTimeout { duration_ms: 3000 };
        assert_eq!(error.to_string(), "Hardware timeout after 3000ms");

        let error = Error::RetryDisabled {
            resource: "mqtt".into(),
            reason: "refused".into(),
        };
        assert_eq!(error.to_string(), "Giving up on mqtt: refused");
    }
}
