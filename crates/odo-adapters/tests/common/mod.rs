//! Shared helpers for the adapter integration tests.
//!
//! Adapters run on real tasks against a [`MemoryBroker`]; tests observe them
//! only through what the broker recorded.

#![allow(dead_code)]

use odo_adapters::{RetryPolicy, SupervisorConfig};
use odo_core::Credential;
use odo_network::MemoryBroker;
use odo_protocol::Envelope;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

pub const ALL_BLOCKS: &str = "[+] Write block 6/0x06 ( ok )\n\
                              [+] Write block 7/0x07 ( ok )\n\
                              [+] Write block 8/0x08 ( ok )\n";

/// Retry quickly so reconnect paths finish within a test.
pub fn fast_config() -> SupervisorConfig {
    let retry = RetryPolicy::default().with_backoff(Duration::from_millis(10));
    SupervisorConfig {
        bus_retry: retry,
        resource_retry: retry,
    }
}

pub fn credential(hex: &str, timestamp: u64) -> Credential {
    Credential::new(26, hex, timestamp).unwrap()
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..5000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Payloads published on `topic`, in order.
pub async fn payloads(broker: &MemoryBroker, topic: &str) -> Vec<Value> {
    broker
        .published(topic)
        .await
        .iter()
        .map(|message| {
            let envelope: Value = serde_json::from_slice(&message.payload).unwrap();
            assert_eq!(envelope["version"], 1);
            envelope["payload"].clone()
        })
        .collect()
}

/// `payload.status` of every message published on `topic`.
pub async fn statuses(broker: &MemoryBroker, topic: &str) -> Vec<String> {
    payloads(broker, topic)
        .await
        .iter()
        .map(|payload| payload["status"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Wait until at least `count` messages were published on `topic`.
pub async fn wait_for_messages(broker: &MemoryBroker, topic: &str, count: usize) {
    wait_until(topic, || async { broker.published(topic).await.len() >= count }).await;
}

pub async fn inject_credential(broker: &MemoryBroker, topic: &str, credential: Credential) {
    let bytes = Envelope::wiegand(credential).encode().unwrap();
    broker.inject(topic, bytes).await;
}
