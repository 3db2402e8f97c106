//! Credential source served over HTTP.
//!
//! The source board publishes its identity at `<base>version` and its
//! credential log at `<base><log>`.

use crate::{
    error::{HardwareError, Result},
    traits::CredentialSource,
    types::SourceInfo,
};
use odo_core::constants::{SOURCE_FETCH_TIMEOUT_SECS, SOURCE_HANDSHAKE_TIMEOUT_SECS};
use std::time::Duration;
use tracing::debug;

/// Credential source polled over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLogSource {
    client: reqwest::Client,
    base_url: String,
    log_name: String,
    handshake_timeout: Duration,
}

impl HttpLogSource {
    /// Create a source rooted at `base_url` serving the log file `log_name`.
    ///
    /// A missing trailing slash on `base_url` is added.
    ///
    /// # Errors
    /// Returns `HardwareError::InitializationFailed` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, log_name: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SOURCE_FETCH_TIMEOUT_SECS))
            .user_agent(concat!("odo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                HardwareError::initialization_failed(format!("failed to build HTTP client: {e}"))
            })?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            log_name: log_name.into(),
            handshake_timeout: Duration::from_secs(SOURCE_HANDSHAKE_TIMEOUT_SECS),
        })
    }

    /// Override the version handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HardwareError::unreachable(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HardwareError::unreachable(format!(
                "GET {url}: unexpected status {status}"
            )));
        }

        Ok(response)
    }
}

impl CredentialSource for HttpLogSource {
    async fn fetch_info(&mut self) -> Result<SourceInfo> {
        let url = self.url("version");
        let response = self.get(&url, Some(self.handshake_timeout)).await?;

        let info = response
            .json::<SourceInfo>()
            .await
            .map_err(|e| HardwareError::invalid_data(format!("GET {url}: {e}")))?;

        debug!(url = %url, ?info, "Source handshake");
        Ok(info)
    }

    async fn fetch_log(&mut self) -> Result<String> {
        let url = self.url(&self.log_name);
        let response = self.get(&url, None).await?;

        response
            .text()
            .await
            .map_err(|e| HardwareError::communication(format!("GET {url}: {e}")))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
