//! Bus client contract.

use crate::error::BusError;
use bytes::Bytes;
use std::future::Future;

/// Message delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe session with a broker.
///
/// Delivery is at-least-once with best-effort ordering per topic. `recv`
/// must be cancel-safe: it is raced against timers and shutdown.
pub trait BusClient: Send {
    /// Open a session. A refusal from the broker is [`BusError::Rejected`].
    fn connect(&mut self) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Subscribe to a topic filter (`+` and `#` wildcards allowed).
    fn subscribe(&mut self, filter: &str) -> impl Future<Output = Result<(), BusError>> + Send;

    fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Wait for the next message on any subscribed topic.
    fn recv(&mut self) -> impl Future<Output = Result<BusMessage, BusError>> + Send;

    /// Close the session. Closing a closed client is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), BusError>> + Send;

    fn is_connected(&self) -> bool;
}

/// MQTT topic filter matching.
///
/// ```
/// use odo_network::topic_matches;
///
/// assert!(topic_matches("devices/+/state", "devices/espkey/state"));
/// assert!(topic_matches("credentials/#", "credentials/seen"));
/// assert!(!topic_matches("credentials/seen", "credentials/selected"));
/// ```
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("credentials/seen", "credentials/seen", true)]
    #[case("credentials/seen", "credentials/seen/x", false)]
    #[case("credentials/+", "credentials/written", true)]
    #[case("+/+/state", "devices/lovense/state", true)]
    #[case("#", "devices/lovense/cmd", true)]
    #[case("devices/#", "credentials/seen", false)]
    #[case("devices/+/cmd", "devices/cmd", false)]
    fn test_topic_matches(#[case] filter: &str, #[case] topic: &str, #[case] expected: bool) {
        assert_eq!(topic_matches(filter, topic), expected);
    }
}
