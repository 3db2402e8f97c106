//! Mock credential source.

use crate::{
    Result,
    error::HardwareError,
    traits::CredentialSource,
    types::SourceInfo,
};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct SourceState {
    info: SourceInfo,
    log: String,
    reachable: bool,
    fetches: usize,
}

/// Credential source whose log is written by a [`MockSourceHandle`].
///
/// # Examples
///
/// ```
/// use odo_hardware::mock::MockCredentialSource;
/// use odo_hardware::traits::CredentialSource;
///
/// #[tokio::main]
/// async fn main() -> odo_hardware::Result<()> {
///     let (mut source, handle) = MockCredentialSource::new();
///
///     handle.append_record(1042, "2ec0c86", 26).await;
///
///     let log = source.fetch_log().await?;
///     assert_eq!(log, "1042 2ec0c86:26\n");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCredentialSource {
    state: Arc<Mutex<SourceState>>,
}

impl MockCredentialSource {
    /// Create a reachable source with an empty log.
    pub fn new() -> (Self, MockSourceHandle) {
        let state = Arc::new(Mutex::new(SourceState {
            info: SourceInfo::new("mock-1.0", "000000"),
            log: String::new(),
            reachable: true,
            fetches: 0,
        }));

        (
            Self {
                state: Arc::clone(&state),
            },
            MockSourceHandle { state },
        )
    }
}

impl CredentialSource for MockCredentialSource {
    async fn fetch_info(&mut self) -> Result<SourceInfo> {
        let state = self.state.lock().await;
        if !state.reachable {
            return Err(HardwareError::unreachable("mock source offline"));
        }
        Ok(state.info.clone())
    }

    async fn fetch_log(&mut self) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.reachable {
            return Err(HardwareError::unreachable("mock source offline"));
        }
        state.fetches += 1;
        Ok(state.log.clone())
    }

    fn describe(&self) -> String {
        "mock://source".to_string()
    }
}

/// Handle for scripting a [`MockCredentialSource`].
#[derive(Debug, Clone)]
pub struct MockSourceHandle {
    state: Arc<Mutex<SourceState>>,
}

impl MockSourceHandle {
    /// Append a well-formed `timestamp hex:bits` record to the log.
    pub async fn append_record(&self, timestamp: u64, hex: &str, bits: u32) {
        self.append_line(&format!("{timestamp} {hex}:{bits}")).await;
    }

    /// Append an arbitrary line to the log.
    pub async fn append_line(&self, line: &str) {
        let mut state = self.state.lock().await;
        state.log.push_str(line);
        state.log.push('\n');
    }

    /// Make every request fail (or succeed again).
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    /// Change the identity returned by the handshake.
    pub async fn set_info(&self, info: SourceInfo) {
        self.state.lock().await.info = info;
    }

    /// Number of successful log fetches so far.
    pub async fn fetches(&self) -> usize {
        self.state.lock().await.fetches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable() {
        let (mut source, handle) = MockCredentialSource::new();
        handle.set_reachable(false).await;

        assert!(matches!(
            source.fetch_info().await,
            Err(HardwareError::Unreachable { .. })
        ));
        assert!(source.fetch_log().await.is_err());
        assert_eq!(handle.fetches().await, 0);

        handle.set_reachable(true).await;
        assert_eq!(source.fetch_log().await.unwrap(), "");
        assert_eq!(handle.fetches().await, 1);
    }
}
