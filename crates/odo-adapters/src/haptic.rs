//! Haptic feedback adapter.
//!
//! Turns credential events into vibration patterns so an operator can feel
//! what the other devices are doing:
//!
//! | Event | Pattern |
//! |-------|---------|
//! | seen, selected | acknowledge |
//! | written `success` | acknowledge |
//! | written `failure` | error |
//! | written `pending` | none |
//!
//! Patterns play on their own tasks so a slow pattern never blocks message
//! handling. All of them belong to a [`JoinSet`] guarded by a child
//! [`CancellationToken`]; releasing the device cancels them and waits for
//! every one to finish before the device is disconnected.

use crate::supervisor::{Adapter, Outbox};
use odo_core::{
    Credential, CredentialCategory, DeviceStatus, Error, Result, WriteStatus,
    constants::{BATTERY_POLL_INTERVAL_SECS, HAPTIC_TICK_MILLIS},
};
use odo_hardware::{HapticDevice, HapticInfo};
use odo_network::BusClient;
use odo_protocol::{CredentialTopics, Envelope, WriteReport};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Sequence of `(level, hold)` steps.
pub type Pattern = &'static [(u8, Duration)];

/// Played for seen, selected and successfully written credentials.
pub const ACKNOWLEDGE: Pattern = &[
    (20, Duration::from_millis(200)),
    (0, Duration::from_millis(100)),
    (10, Duration::from_millis(200)),
    (0, Duration::ZERO),
];

/// Played for failed writes.
pub const ERROR: Pattern = &[
    (15, Duration::from_millis(200)),
    (10, Duration::from_millis(200)),
    (5, Duration::from_millis(200)),
    (0, Duration::ZERO),
];

/// Published haptic fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HapticDetails {
    pub device_type: Option<String>,
    pub version: Option<String>,
    pub mac_addr: Option<String>,
    pub batch: Option<String>,
    pub battery: Option<u8>,
}

impl From<HapticInfo> for HapticDetails {
    fn from(info: HapticInfo) -> Self {
        Self {
            device_type: Some(info.device_type),
            version: Some(info.version),
            mac_addr: Some(info.mac_addr),
            batch: info.batch,
            battery: None,
        }
    }
}

/// Pattern to play for a credential event, if any.
///
/// ```
/// use odo_adapters::haptic::{pattern_for, ACKNOWLEDGE, ERROR};
/// use odo_core::{CredentialCategory, WriteStatus};
///
/// assert_eq!(pattern_for(CredentialCategory::Seen, None), Some(ACKNOWLEDGE));
/// assert_eq!(pattern_for(CredentialCategory::Written, Some(WriteStatus::Failure)), Some(ERROR));
/// assert_eq!(pattern_for(CredentialCategory::Written, Some(WriteStatus::Pending)), None);
/// ```
pub fn pattern_for(category: CredentialCategory, status: Option<WriteStatus>) -> Option<Pattern> {
    match (category, status) {
        (CredentialCategory::Seen | CredentialCategory::Selected, _) => Some(ACKNOWLEDGE),
        (CredentialCategory::Written, Some(WriteStatus::Success)) => Some(ACKNOWLEDGE),
        (CredentialCategory::Written, Some(WriteStatus::Failure)) => Some(ERROR),
        (CredentialCategory::Written, _) => None,
    }
}

async fn play<H: HapticDevice>(
    device: Arc<Mutex<H>>,
    pattern: Pattern,
    cancel: CancellationToken,
) -> odo_hardware::Result<()> {
    for &(level, hold) in pattern {
        if cancel.is_cancelled() {
            break;
        }
        device.lock().await.vibrate(level).await?;
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(hold) => {}
        }
    }
    Ok(())
}

/// Adapter playing vibration patterns on a [`HapticDevice`].
#[derive(Debug)]
pub struct HapticAdapter<H> {
    name: String,
    device: Arc<Mutex<H>>,
    topics: CredentialTopics,
    details: HapticDetails,
    patterns: JoinSet<odo_hardware::Result<()>>,
    root: CancellationToken,
    session: CancellationToken,
    battery_interval: Duration,
    last_battery: Option<Instant>,
}

impl<H: HapticDevice + 'static> HapticAdapter<H> {
    pub fn new(name: impl Into<String>, device: H, topics: CredentialTopics) -> Self {
        let root = CancellationToken::new();
        Self {
            name: name.into(),
            device: Arc::new(Mutex::new(device)),
            topics,
            details: HapticDetails::default(),
            patterns: JoinSet::new(),
            session: root.child_token(),
            root,
            battery_interval: Duration::from_secs(BATTERY_POLL_INTERVAL_SECS),
            last_battery: None,
        }
    }

    pub fn with_battery_interval(mut self, interval: Duration) -> Self {
        self.battery_interval = interval;
        self
    }

    /// Number of patterns still playing.
    pub fn playing(&self) -> usize {
        self.patterns.len()
    }

    fn spawn(&mut self, pattern: Pattern) {
        self.patterns
            .spawn(play(Arc::clone(&self.device), pattern, self.session.clone()));
    }

    /// Collect finished patterns.
    ///
    /// # Errors
    /// Returns `Error::Transport` if a pattern could not be written to the
    /// device.
    fn reap(&mut self) -> Result<()> {
        while let Some(joined) = self.patterns.try_join_next() {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            error!(adapter = %self.name, error = %failure, "Pattern failed");
            return Err(Error::Transport(format!("device write failed: {failure}")));
        }
        Ok(())
    }

    async fn stop_patterns(&mut self) {
        self.session.cancel();
        while self.patterns.join_next().await.is_some() {}
        self.session = self.root.child_token();
    }

    async fn poll_battery<B: BusClient>(&mut self, outbox: &mut Outbox<'_, B>) -> Result<()> {
        if self
            .last_battery
            .is_some_and(|at| at.elapsed() < self.battery_interval)
        {
            return Ok(());
        }
        self.last_battery = Some(Instant::now());

        let level = self.device.lock().await.battery().await?;
        if self.details.battery != Some(level) {
            debug!(adapter = %self.name, level, "Battery");
            self.details.battery = Some(level);
            outbox
                .publish_state(DeviceStatus::Connected, self.details.clone())
                .await?;
        }
        Ok(())
    }
}

impl<H: HapticDevice + 'static> Adapter for HapticAdapter<H> {
    type Details = HapticDetails;

    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![
            self.topics.seen.clone(),
            self.topics.selected.clone(),
            self.topics.written.clone(),
        ]
    }

    fn details(&self) -> HapticDetails {
        self.details.clone()
    }

    async fn connect(&mut self) -> Result<()> {
        let info = self.device.lock().await.connect().await?;
        info!(
            adapter = %self.name,
            device_type = %info.device_type,
            version = %info.version,
            mac_addr = %info.mac_addr,
            "Device connected"
        );
        self.details = HapticDetails::from(info);
        self.last_battery = None;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.stop_patterns().await;
        self.device.lock().await.disconnect().await?;
        Ok(())
    }

    async fn on_message<B: BusClient>(
        &mut self,
        topic: &str,
        envelope: Envelope<Value>,
        _outbox: &mut Outbox<'_, B>,
    ) -> Result<()> {
        self.reap()?;

        let Some(category) = self.topics.category_of(topic) else {
            debug!(adapter = %self.name, topic, "Ignoring message");
            return Ok(());
        };

        let status = match category {
            CredentialCategory::Written => {
                let report: WriteReport = envelope.into_payload()?;
                debug!(
                    adapter = %self.name,
                    credential = %report.credential,
                    status = %report.status,
                    "Write report"
                );
                Some(report.status)
            }
            _ => {
                let credential: Credential = envelope.into_payload()?;
                debug!(adapter = %self.name, %credential, %category, "Credential");
                None
            }
        };

        if let Some(pattern) = pattern_for(category, status) {
            self.spawn(pattern);
        }
        Ok(())
    }

    async fn tick<B: BusClient>(&mut self, outbox: &mut Outbox<'_, B>) -> Result<Option<Duration>> {
        self.reap()?;
        self.poll_battery(outbox).await?;
        Ok(Some(Duration::from_millis(HAPTIC_TICK_MILLIS)))
    }
}
