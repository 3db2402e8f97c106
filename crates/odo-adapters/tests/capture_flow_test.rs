//! Capture adapter end to end: source log in, seen credentials out.

mod common;

use common::{fast_config, payloads, statuses, wait_for_messages, wait_until};
use odo_adapters::{AdapterHandle, CaptureAdapter, Supervisor};
use odo_hardware::mock::{MockCredentialSource, MockSourceHandle};
use odo_network::MemoryBroker;
use odo_protocol::CredentialTopics;
use serde_json::json;
use std::time::Duration;

const STATE: &str = "devices/espkey/state";
const SEEN: &str = "credentials/seen";

fn start(broker: &MemoryBroker) -> (AdapterHandle, MockSourceHandle) {
    let (source, handle) = MockCredentialSource::new();
    let adapter = CaptureAdapter::new("espkey", source, CredentialTopics::default())
        .with_poll_interval(Duration::from_millis(5));
    let adapter = Supervisor::new(adapter, broker.client("espkey"), fast_config()).start();
    (adapter, handle)
}

/// Let the adapter poll the current log a few more times.
async fn settle(source: &MockSourceHandle) {
    let fetches = source.fetches().await;
    wait_until("polls", || async { source.fetches().await >= fetches + 3 }).await;
}

#[tokio::test]
async fn test_state_carries_source_identity() {
    let broker = MemoryBroker::new();
    let (adapter, _source) = start(&broker);
    wait_for_messages(&broker, STATE, 1).await;

    let states = payloads(&broker, STATE).await;
    assert_eq!(
        states[0],
        json!({"status": "connected", "version": "mock-1.0", "ChipID": "000000"})
    );

    adapter.terminate();
    adapter.join().await.unwrap();
}

#[tokio::test]
async fn test_new_record_published_once() {
    let broker = MemoryBroker::new();
    let (adapter, source) = start(&broker);
    source.append_record(1042, "2ec0c86", 26).await;

    wait_for_messages(&broker, SEEN, 1).await;
    settle(&source).await;

    let seen = payloads(&broker, SEEN).await;
    assert_eq!(seen, vec![json!({"bits": 26, "hex": "2ec0c86", "timestamp": 1042})]);

    adapter.terminate();
    adapter.join().await.unwrap();
}

#[tokio::test]
async fn test_repeat_credential_suppressed() {
    let broker = MemoryBroker::new();
    let (adapter, source) = start(&broker);
    source.append_record(1, "1A2B3C", 26).await;
    wait_for_messages(&broker, SEEN, 1).await;

    source.append_record(2, "1A2B3C", 26).await;
    settle(&source).await;
    assert_eq!(broker.published(SEEN).await.len(), 1);

    source.append_record(3, "2ec0c86", 26).await;
    wait_for_messages(&broker, SEEN, 2).await;
    assert_eq!(payloads(&broker, SEEN).await[1]["timestamp"], 3);

    adapter.terminate();
    adapter.join().await.unwrap();
}

#[tokio::test]
async fn test_malformed_lines_skipped() {
    let broker = MemoryBroker::new();
    let (adapter, source) = start(&broker);
    source.append_line("booting...").await;
    source.append_line("12 ZZZ:26").await;
    source.append_record(13, "1A2B3C", 26).await;

    wait_for_messages(&broker, SEEN, 1).await;
    assert_eq!(payloads(&broker, SEEN).await[0]["hex"], "1A2B3C");
    assert!(!adapter.is_finished());

    adapter.terminate();
    adapter.join().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_source_reconnects() {
    let broker = MemoryBroker::new();
    let (adapter, source) = start(&broker);
    wait_for_messages(&broker, STATE, 1).await;

    source.set_reachable(false).await;
    wait_for_messages(&broker, STATE, 2).await;
    source.append_record(5, "1A2B3C", 26).await;
    source.set_reachable(true).await;
    wait_for_messages(&broker, STATE, 3).await;
    wait_for_messages(&broker, SEEN, 1).await;

    adapter.terminate();
    adapter.join().await.unwrap();

    assert_eq!(
        statuses(&broker, STATE).await,
        vec!["connected", "disconnected", "connected", "disconnected"]
    );
}

#[tokio::test]
async fn test_broker_outage_keeps_dedup_cache() {
    let broker = MemoryBroker::new();
    let (adapter, source) = start(&broker);
    source.append_record(1, "1A2B3C", 26).await;
    wait_for_messages(&broker, SEEN, 1).await;

    broker.set_available(false).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    broker.set_available(true).await;

    // Reconnected: a fresh state is announced, the old record is not replayed.
    wait_until("reconnect", || async {
        statuses(&broker, STATE).await.iter().filter(|s| *s == "connected").count() >= 2
    })
    .await;
    settle(&source).await;
    assert_eq!(broker.published(SEEN).await.len(), 1);

    adapter.terminate();
    adapter.join().await.unwrap();
}
