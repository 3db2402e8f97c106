//! Capture and deduplication of credentials read from a source log.
//!
//! The source keeps every card read in an append-only log, so each poll
//! returns all records again. [`CaptureStage`] turns a log into at most one
//! new credential per poll:
//!
//! ```text
//! log ──parse──▶ records ──unseen timestamp──▶ last new record ──hex ≠ latest──▶ publish
//!                  │ malformed: logged, skipped        │ same hex: repeat, dropped
//! ```

use crate::supervisor::{Adapter, Outbox};
use odo_core::{Credential, Result, constants::DEFAULT_POLL_INTERVAL_SECS};
use odo_hardware::{SourceInfo, traits::CredentialSource};
use odo_network::BusClient;
use odo_protocol::{CredentialTopics, Envelope, LogRecordParser};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the capture stage has already acted upon.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupCache {
    seen: HashSet<u64>,
    latest: Option<String>,
}

impl DedupCache {
    /// Record `timestamp`. Returns `false` if it was already seen.
    pub fn mark_seen(&mut self, timestamp: u64) -> bool {
        self.seen.insert(timestamp)
    }

    pub fn is_seen(&self, timestamp: u64) -> bool {
        self.seen.contains(&timestamp)
    }

    /// Hex of the last credential published.
    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    /// Make `credential` the latest one. Returns `false` if it repeats the
    /// current latest.
    pub fn update_latest(&mut self, credential: &Credential) -> bool {
        if self.latest.as_deref() == Some(credential.hex()) {
            return false;
        }
        self.latest = Some(credential.hex().to_string());
        true
    }
}

/// Records of one log that the cache has not acted upon yet.
///
/// Nothing is recorded until the scan is handed to
/// [`CaptureStage::commit`], so a candidate whose publication failed is
/// found again by the next scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogScan {
    unseen: Vec<u64>,
    candidate: Option<Credential>,
}

impl LogScan {
    /// Timestamps of the new records, in log order.
    pub fn unseen(&self) -> &[u64] {
        &self.unseen
    }

    /// Credential to publish, if any.
    pub fn candidate(&self) -> Option<&Credential> {
        self.candidate.as_ref()
    }
}

/// Pure capture logic: log text in, credential to publish out.
///
/// # Examples
///
/// ```
/// use odo_adapters::capture::CaptureStage;
///
/// let mut stage = CaptureStage::new();
///
/// let first = stage.ingest("100 1A2B3C:26\n").unwrap();
/// assert_eq!(first.hex(), "1A2B3C");
///
/// // Same log again: nothing new
/// assert!(stage.ingest("100 1A2B3C:26\n").is_none());
///
/// // Same card read again later: a repeat
/// assert!(stage.ingest("100 1A2B3C:26\n101 1A2B3C:26\n").is_none());
/// ```
#[derive(Debug, Default)]
pub struct CaptureStage {
    parser: LogRecordParser,
    cache: DedupCache,
}

impl CaptureStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Find the records of `log` with an unseen timestamp.
    ///
    /// Only the last of them is a candidate, and only if its hex differs from
    /// the latest published credential. The cache is left untouched.
    pub fn scan(&self, log: &str) -> LogScan {
        let mut scan = LogScan::default();

        for record in self.parser.parse_log(log) {
            match record {
                Ok(credential) => {
                    let timestamp = credential.timestamp();
                    if self.cache.is_seen(timestamp) || scan.unseen.contains(&timestamp) {
                        continue;
                    }
                    debug!(%credential, timestamp, "New credential from log");
                    scan.unseen.push(timestamp);
                    scan.candidate = Some(credential);
                }
                Err(e) => warn!(error = %e, "Log record skipped"),
            }
        }

        let latest = self.cache.latest();
        if let Some(repeat) = scan.candidate.take_if(|c| latest == Some(c.hex())) {
            info!(hex = %repeat.hex(), "Repeat credential");
        }
        scan
    }

    /// Record `scan` as acted upon. Returns its candidate.
    pub fn commit(&mut self, scan: LogScan) -> Option<Credential> {
        for timestamp in scan.unseen {
            self.cache.mark_seen(timestamp);
        }
        if let Some(credential) = &scan.candidate {
            self.cache.update_latest(credential);
        }
        scan.candidate
    }

    /// Scan and commit `log` in one step.
    pub fn ingest(&mut self, log: &str) -> Option<Credential> {
        let scan = self.scan(log);
        self.commit(scan)
    }
}

/// Adapter polling a [`CredentialSource`] and publishing new credentials on
/// the seen topic.
#[derive(Debug)]
pub struct CaptureAdapter<S> {
    name: String,
    source: S,
    stage: CaptureStage,
    topics: CredentialTopics,
    poll_interval: Duration,
    info: SourceInfo,
}

impl<S: CredentialSource> CaptureAdapter<S> {
    pub fn new(name: impl Into<String>, source: S, topics: CredentialTopics) -> Self {
        Self {
            name: name.into(),
            source,
            stage: CaptureStage::new(),
            topics,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            info: SourceInfo::default(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn stage(&self) -> &CaptureStage {
        &self.stage
    }
}

impl<S: CredentialSource> Adapter for CaptureAdapter<S> {
    type Details = SourceInfo;

    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<String> {
        Vec::new()
    }

    fn details(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn connect(&mut self) -> Result<()> {
        self.info = self.source.fetch_info().await?;
        info!(
            adapter = %self.name,
            source = %self.source.describe(),
            version = ?self.info.version,
            chip_id = ?self.info.chip_id,
            "Source connected"
        );
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_message<B: BusClient>(
        &mut self,
        topic: &str,
        _envelope: Envelope<Value>,
        _outbox: &mut Outbox<'_, B>,
    ) -> Result<()> {
        debug!(adapter = %self.name, topic, "Ignoring message");
        Ok(())
    }

    async fn tick<B: BusClient>(
        &mut self,
        outbox: &mut Outbox<'_, B>,
    ) -> Result<Option<Duration>> {
        let log = self.source.fetch_log().await?;
        let scan = self.stage.scan(&log);

        if let Some(credential) = scan.candidate() {
            info!(
                adapter = %self.name,
                %credential,
                topic = %self.topics.seen,
                "Publishing credential"
            );
            outbox
                .publish(&self.topics.seen, &Envelope::wiegand(credential.clone()))
                .await?;
        }

        match self.stage.commit(scan) {
            Some(_) => Ok(Some(Duration::ZERO)),
            None => Ok(Some(self.poll_interval)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odo_hardware::mock::MockCredentialSource;
    use odo_network::MemoryBroker;
    use rstest::rstest;

    #[test]
    fn test_same_timestamp_emitted_once() {
        let mut stage = CaptureStage::new();
        assert!(stage.ingest("7 2ec0c86:26").is_some());
        assert!(stage.ingest("7 2ec0c86:26").is_none());
        assert!(stage.ingest("7 1A2B3C:26").is_none());
    }

    #[test]
    fn test_last_new_record_wins() {
        let mut stage = CaptureStage::new();
        let credential = stage.ingest("1 1A2B3C:26\n2 2ec0c86:26\n3 3FF:26\n").unwrap();

        assert_eq!(credential.hex(), "3FF");
        assert_eq!(credential.timestamp(), 3);
        assert!(stage.cache().is_seen(1));
        assert!(stage.cache().is_seen(2));
    }

    #[test]
    fn test_repeat_hex_is_not_emitted() {
        let mut stage = CaptureStage::new();
        stage.ingest("1 1A2B3C:26").unwrap();

        assert!(stage.ingest("1 1A2B3C:26\n2 1A2B3C:26").is_none());
        assert_eq!(stage.cache().latest(), Some("1A2B3C"));

        let next = stage.ingest("1 1A2B3C:26\n2 1A2B3C:26\n3 2ec0c86:26").unwrap();
        assert_eq!(next.hex(), "2ec0c86");
    }

    #[test]
    fn test_card_presented_again_after_another() {
        let mut stage = CaptureStage::new();
        stage.ingest("1 1A2B3C:26").unwrap();
        stage.ingest("2 2ec0c86:26").unwrap();

        let again = stage.ingest("3 1A2B3C:26").unwrap();
        assert_eq!(again.timestamp(), 3);
    }

    #[rstest]
    #[case("garbage\n5 1A2B3C:26")]
    #[case("5 1A2B3C:26\n6 XYZ:26")]
    #[case("5 1A2B3C:26\n6 FFFFFFFF:8\n")]
    #[case("\n\n5 1A2B3C:26\n\n")]
    fn test_malformed_records_are_skipped(#[case] log: &str) {
        let mut stage = CaptureStage::new();
        let credential = stage.ingest(log).unwrap();
        assert_eq!(credential.hex(), "1A2B3C");
    }

    #[test]
    fn test_scan_leaves_cache_untouched() {
        let mut stage = CaptureStage::new();
        let log = "1 1A2B3C:26\n2 2ec0c86:26\n2 3FF:26\n";

        let first = stage.scan(log);
        assert_eq!(first.unseen(), &[1, 2]);
        assert_eq!(first.candidate().map(Credential::hex), Some("2ec0c86"));
        assert_eq!(stage.scan(log), first);

        assert_eq!(stage.commit(first).map(|c| c.timestamp()), Some(2));
        assert!(stage.cache().is_seen(1));
        assert_eq!(stage.cache().latest(), Some("2ec0c86"));
        assert_eq!(stage.scan(log), LogScan::default());
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried() {
        let broker = MemoryBroker::new();
        let (source, handle) = MockCredentialSource::new();
        handle.append_record(1, "2ec0c86", 26).await;
        let mut adapter = CaptureAdapter::new("espkey", source, CredentialTopics::default());

        let mut offline = broker.client("espkey");
        let mut outbox = Outbox::new(&mut offline, "espkey", "devices/espkey/state");
        let error = adapter.tick(&mut outbox).await.unwrap_err();
        assert!(error.is_retryable());
        assert!(!adapter.stage().cache().is_seen(1));
        assert_eq!(adapter.stage().cache().latest(), None);

        let mut online = broker.client("espkey");
        online.connect().await.unwrap();
        let mut outbox = Outbox::new(&mut online, "espkey", "devices/espkey/state");
        assert_eq!(adapter.tick(&mut outbox).await.unwrap(), Some(Duration::ZERO));
        assert_eq!(
            adapter.tick(&mut outbox).await.unwrap(),
            Some(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
        );

        let seen = broker.published("credentials/seen").await;
        assert_eq!(seen.len(), 1);
        assert_eq!(adapter.stage().cache().latest(), Some("2ec0c86"));
    }

    #[test]
    fn test_empty_log() {
        let mut stage = CaptureStage::new();
        assert!(stage.ingest("").is_none());
        assert_eq!(stage.cache().latest(), None);
    }
}
