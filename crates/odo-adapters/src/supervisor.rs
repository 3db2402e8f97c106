//! Adapter supervisor.
//!
//! The supervisor owns one adapter and one bus client and drives them
//! through the [`Lifecycle`]:
//!
//! 1. CONNECTING: open the bus session and subscribe, then run the adapter's
//!    resource handshake. Each step retries on its own [`RetryPolicy`].
//! 2. RUNNING: publish `status=connected` once, then dispatch bus messages
//!    and periodic ticks to the adapter one at a time.
//! 3. A retryable error while running releases the resource, publishes
//!    `status=disconnected` and goes back to CONNECTING.
//! 4. STOPPING: on cancellation, a fatal error, or a panic inside the
//!    adapter, release the resource and publish exactly one
//!    `status=disconnected` before STOPPED.
//!
//! # Error Handling
//!
//! | Error | While connecting | While running |
//! |-------|------------------|---------------|
//! | retryable | backoff, or fatal if retry is off | reconnect |
//! | parse / configuration | counts as a failed attempt | logged, message skipped |
//! | fatal | stop | stop |

use crate::lifecycle::{Lifecycle, LifecycleState, RetryPolicy};
use futures::FutureExt;
use odo_core::{DeviceStatus, Error, Result};
use odo_network::{BusClient, BusMessage};
use odo_protocol::{CommandPayload, DeviceState, DeviceTopics, Envelope, MessageType};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Publishing side of the bus, lent to an adapter while it handles a message.
pub struct Outbox<'a, B> {
    bus: &'a mut B,
    adapter: &'a str,
    state_topic: &'a str,
}

impl<'a, B: BusClient> Outbox<'a, B> {
    pub fn new(bus: &'a mut B, adapter: &'a str, state_topic: &'a str) -> Self {
        Self {
            bus,
            adapter,
            state_topic,
        }
    }

    /// Encode and publish `envelope` on `topic`.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the bus session is gone.
    pub async fn publish<P: Serialize + Sync>(
        &mut self,
        topic: &str,
        envelope: &Envelope<P>,
    ) -> Result<()> {
        let bytes = envelope.encode()?;
        debug!(adapter = %self.adapter, topic, kind = %envelope.kind, "Publish");
        self.bus.publish(topic, bytes.into()).await?;
        Ok(())
    }

    /// Publish the adapter's state on its state topic.
    pub async fn publish_state<D: Serialize + Sync>(
        &mut self,
        status: DeviceStatus,
        details: D,
    ) -> Result<()> {
        let topic = self.state_topic;
        self.publish(topic, &Envelope::state(DeviceState::new(status, details)))
            .await
    }
}

/// A device adapter driven by a [`Supervisor`].
///
/// Handlers run one at a time. An error returned from a handler is
/// classified by the supervisor: parse and configuration errors skip the
/// message, retryable errors reconnect, fatal errors stop the adapter.
pub trait Adapter: Send {
    /// Adapter specific fields of the published device state.
    type Details: Serialize + Send + Sync;

    /// Module name, used in topics and logs.
    fn name(&self) -> &str;

    /// Credential topics to subscribe to besides the command topic.
    fn subscriptions(&self) -> Vec<String>;

    /// Current adapter specific state.
    fn details(&self) -> Self::Details;

    /// Handshake with the external resource.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release the external resource. Must be safe to call at any time.
    fn release(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Handle a message on one of [`subscriptions`](Adapter::subscriptions).
    fn on_message<B: BusClient>(
        &mut self,
        topic: &str,
        envelope: Envelope<Value>,
        outbox: &mut Outbox<'_, B>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Handle a `set` command.
    fn on_command<B: BusClient>(
        &mut self,
        command: CommandPayload,
        _outbox: &mut Outbox<'_, B>,
    ) -> impl Future<Output = Result<()>> + Send {
        let name = self.name().to_string();
        async move {
            warn!(adapter = %name, ?command, "Command parsing not implemented");
            Ok(())
        }
    }

    /// Periodic work. Returns the delay before the next tick, or `None` to
    /// stop ticking.
    fn tick<B: BusClient>(
        &mut self,
        _outbox: &mut Outbox<'_, B>,
    ) -> impl Future<Output = Result<Option<Duration>>> + Send {
        async { Ok(None) }
    }
}

/// Retry settings of a supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Retry policy for the bus session.
    pub bus_retry: RetryPolicy,
    /// Retry policy for the adapter's resource.
    pub resource_retry: RetryPolicy,
}

enum Event {
    Cancelled,
    Message(std::result::Result<BusMessage, odo_network::BusError>),
    Tick,
}

/// Runs one adapter on one bus client.
pub struct Supervisor<A, B> {
    adapter: A,
    bus: B,
    name: String,
    topics: DeviceTopics,
    config: SupervisorConfig,
    lifecycle: Lifecycle,
    session_opened: bool,
}

impl<A: Adapter, B: BusClient> Supervisor<A, B> {
    pub fn new(adapter: A, bus: B, config: SupervisorConfig) -> Self {
        let name = adapter.name().to_string();
        Self {
            topics: DeviceTopics::for_adapter(&name),
            adapter,
            bus,
            name,
            config,
            lifecycle: Lifecycle::new(),
            session_opened: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Spawn [`run`](Supervisor::run) on its own task.
    pub fn start(self) -> AdapterHandle
    where
        A: 'static,
        B: 'static,
    {
        let cancel = CancellationToken::new();
        let name = self.name.clone();
        let task = tokio::spawn(self.run(cancel.clone()));
        AdapterHandle { name, cancel, task }
    }

    /// Drive the adapter until `cancel` fires or a fatal error occurs.
    ///
    /// Every exit path goes through STOPPING: the resource is released and,
    /// if a bus session was ever opened, one `status=disconnected` is
    /// published.
    ///
    /// # Errors
    /// Returns the fatal error (including a panic of the adapter) that
    /// stopped it. A requested stop returns `Ok(())`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(adapter = %self.name, "Adapter starting");

        let outcome = match AssertUnwindSafe(self.drive(&cancel)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(Error::Panic(panic_message(panic.as_ref()))),
        };

        if let Err(e) = &outcome {
            error!(adapter = %self.name, error = %e, "Adapter failed");
        }

        self.stop().await;
        outcome
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.enter(LifecycleState::Connecting)?;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                connected = self.connect() => connected?,
            }

            self.enter(LifecycleState::Running)?;

            let serving = match self.announce(DeviceStatus::Connected).await {
                Ok(()) => self.serve(cancel).await,
                Err(e) => Err(e),
            };

            match serving {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    warn!(adapter = %self.name, error = %e, "Connection lost, reconnecting");
                    self.release().await;
                    if self.bus.is_connected() {
                        if let Err(e) = self.announce(DeviceStatus::Disconnected).await {
                            debug!(
                                adapter = %self.name,
                                error = %e,
                                "Disconnected state not published"
                            );
                        }
                    }
                    self.enter(LifecycleState::Connecting)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn enter(&mut self, state: LifecycleState) -> Result<()> {
        let transition = self.lifecycle.transition_to(state)?;
        info!(adapter = %self.name, from = %transition.from, to = %transition.to, "Lifecycle");
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        let mut attempt = 0;
        while !self.bus.is_connected() {
            attempt += 1;
            match self.open_session().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let _ = self.bus.disconnect().await;
                    self.config
                        .bus_retry
                        .backoff(&self.name, "bus", attempt, &e)
                        .await?;
                }
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.adapter.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.release().await;
                    self.config
                        .resource_retry
                        .backoff(&self.name, "resource", attempt, &e)
                        .await?;
                }
            }
        }
    }

    async fn open_session(&mut self) -> Result<()> {
        self.bus.connect().await?;
        self.session_opened = true;

        self.bus.subscribe(&self.topics.command).await?;
        for topic in self.adapter.subscriptions() {
            self.bus.subscribe(&topic).await?;
        }

        debug!(adapter = %self.name, command = %self.topics.command, "Subscribed");
        Ok(())
    }

    async fn serve(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut next_tick = Some(Instant::now());

        loop {
            let event = {
                let deadline = next_tick;
                let tick = async move {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Event::Cancelled,
                    message = self.bus.recv() => Event::Message(message),
                    () = tick => Event::Tick,
                }
            };

            let result = match event {
                Event::Cancelled => return Ok(()),
                Event::Message(message) => self.dispatch(message?).await,
                Event::Tick => {
                    let mut outbox = Outbox::new(&mut self.bus, &self.name, &self.topics.state);
                    self.adapter
                        .tick(&mut outbox)
                        .await
                        .map(|delay| next_tick = delay.map(|d| Instant::now() + d))
                }
            };

            match result {
                Ok(()) => {}
                Err(
                    e @ (Error::Parse(_) | Error::InvalidCredential(_) | Error::Configuration(_)),
                ) => {
                    warn!(adapter = %self.name, error = %e, "Message skipped");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(&mut self, message: BusMessage) -> Result<()> {
        debug!(
            adapter = %self.name,
            topic = %message.topic,
            bytes = message.payload.len(),
            "Message received"
        );

        let envelope = Envelope::<Value>::decode(&message.payload)?;
        let mut outbox = Outbox::new(&mut self.bus, &self.name, &self.topics.state);

        if message.topic == self.topics.command {
            if envelope.kind != MessageType::Set {
                warn!(adapter = %self.name, kind = %envelope.kind, "Command type not implemented");
                return Ok(());
            }
            let command = envelope.into_payload::<CommandPayload>()?;
            self.adapter.on_command(command, &mut outbox).await
        } else {
            self.adapter
                .on_message(&message.topic, envelope, &mut outbox)
                .await
        }
    }

    async fn announce(&mut self, status: DeviceStatus) -> Result<()> {
        let details = self.adapter.details();
        Outbox::new(&mut self.bus, &self.name, &self.topics.state)
            .publish_state(status, details)
            .await?;
        info!(adapter = %self.name, %status, "State published");
        Ok(())
    }

    async fn release(&mut self) {
        match AssertUnwindSafe(self.adapter.release()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(adapter = %self.name, error = %e, "Resource release failed"),
            Err(panic) => error!(
                adapter = %self.name,
                panic = %panic_message(panic.as_ref()),
                "Resource release panicked"
            ),
        }
    }

    async fn stop(&mut self) {
        if let Err(e) = self.enter(LifecycleState::Stopping) {
            warn!(adapter = %self.name, error = %e, "Unexpected stop");
        }

        self.release().await;

        if self.session_opened {
            if !self.bus.is_connected() {
                let _ = self.bus.connect().await;
            }
            if let Err(e) = self.announce(DeviceStatus::Disconnected).await {
                warn!(adapter = %self.name, error = %e, "Disconnected state not published");
            }
            if let Err(e) = self.bus.disconnect().await {
                debug!(adapter = %self.name, error = %e, "Bus disconnect failed");
            }
        }

        if let Err(e) = self.enter(LifecycleState::Stopped) {
            warn!(adapter = %self.name, error = %e, "Unexpected stop");
        }
        info!(adapter = %self.name, "Adapter stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a supervisor running on its own task.
#[derive(Debug)]
pub struct AdapterHandle {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl AdapterHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request shutdown. Returns immediately; use [`join`](Self::join) to
    /// wait for the adapter to stop.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the adapter task to end.
    ///
    /// # Errors
    /// Returns the error that stopped the adapter.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(Error::Panic(panic_message(e.into_panic().as_ref()))),
            Err(e) => Err(Error::Panic(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odo_network::MemoryBroker;
    use odo_protocol::NoDetails;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter whose resource and handlers are scripted through shared counters.
    #[derive(Debug, Default, Clone)]
    struct Scripted {
        connect_failures: Arc<AtomicUsize>,
        fatal_connect: bool,
        connects: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        messages: Arc<AtomicUsize>,
        panic_on_message: bool,
    }

    impl Adapter for Scripted {
        type Details = NoDetails;

        fn name(&self) -> &str {
            "scripted"
        }

        fn subscriptions(&self) -> Vec<String> {
            vec!["credentials/seen".to_string()]
        }

        fn details(&self) -> NoDetails {
            NoDetails {}
        }

        async fn connect(&mut self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fatal_connect {
                return Err(Error::StreamClosed("scripted".into()));
            }
            let remaining = self.connect_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.connect_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Transport("scripted offline".into()));
            }
            Ok(())
        }

        async fn release(&mut self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_message<B: BusClient>(
            &mut self,
            _topic: &str,
            envelope: Envelope<Value>,
            _outbox: &mut Outbox<'_, B>,
        ) -> Result<()> {
            if self.panic_on_message {
                panic!("handler blew up");
            }
            if envelope.payload == json!("lost") {
                return Err(Error::Transport("scripted lost".into()));
            }
            self.messages.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn statuses(messages: &[BusMessage]) -> Vec<String> {
        messages
            .iter()
            .map(|m| {
                let value: Value = serde_json::from_slice(&m.payload).unwrap();
                value["payload"]["status"].as_str().unwrap().to_string()
            })
            .collect()
    }

    async fn wait_for_state(broker: &MemoryBroker, count: usize) {
        for _ in 0..1000 {
            if broker.published("devices/scripted/state").await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("no state published");
    }

    fn fast_retry() -> SupervisorConfig {
        let retry = RetryPolicy::default().with_backoff(Duration::from_millis(10));
        SupervisorConfig {
            bus_retry: retry,
            resource_retry: retry,
        }
    }

    #[tokio::test]
    async fn test_connected_once_then_disconnected_once() {
        let broker = MemoryBroker::new();
        let scripted = Scripted::default();
        let handle =
            Supervisor::new(scripted.clone(), broker.client("scripted"), fast_retry()).start();

        wait_for_state(&broker, 1).await;
        handle.terminate();
        handle.join().await.unwrap();

        let states = broker.published("devices/scripted/state").await;
        assert_eq!(statuses(&states), vec!["connected", "disconnected"]);
        assert_eq!(scripted.releases.load(Ordering::SeqCst), 1);
        assert_eq!(broker.sessions().await, 0);
    }

    #[tokio::test]
    async fn test_resource_retried_until_available() {
        let broker = MemoryBroker::new();
        let scripted = Scripted::default();
        scripted.connect_failures.store(2, Ordering::SeqCst);

        let handle =
            Supervisor::new(scripted.clone(), broker.client("scripted"), fast_retry()).start();
        wait_for_state(&broker, 1).await;

        assert_eq!(scripted.connects.load(Ordering::SeqCst), 3);
        handle.terminate();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_during_resource_backoff() {
        let broker = MemoryBroker::new();
        let scripted = Scripted::default();
        scripted.connect_failures.store(usize::MAX, Ordering::SeqCst);
        let config = SupervisorConfig {
            resource_retry: RetryPolicy::default().with_backoff(Duration::from_secs(10)),
            ..fast_retry()
        };

        let handle = Supervisor::new(scripted.clone(), broker.client("scripted"), config).start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scripted.connects.load(Ordering::SeqCst), 1);

        handle.terminate();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("adapter still sleeping in backoff")
            .unwrap();

        let states = broker.published("devices/scripted/state").await;
        assert_eq!(statuses(&states), vec!["disconnected"]);
        assert_eq!(broker.sessions().await, 0);
    }

    #[tokio::test]
    async fn test_retry_disabled_is_fatal() {
        let broker = MemoryBroker::new();
        let scripted = Scripted::default();
        scripted.connect_failures.store(1, Ordering::SeqCst);
        let config = SupervisorConfig {
            resource_retry: RetryPolicy::disabled(),
            ..fast_retry()
        };

        let result = Supervisor::new(scripted, broker.client("scripted"), config)
            .run(CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::RetryDisabled { .. })));
        let states = broker.published("devices/scripted/state").await;
        assert_eq!(statuses(&states), vec!["disconnected"]);
    }

    #[tokio::test]
    async fn test_fatal_resource_error_stops_without_retry() {
        let broker = MemoryBroker::new();
        let scripted = Scripted {
            fatal_connect: true,
            ..Scripted::default()
        };

        let result = Supervisor::new(scripted.clone(), broker.client("scripted"), fast_retry())
            .run(CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::StreamClosed(_))));
        assert_eq!(scripted.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_bus_is_fatal_and_silent() {
        let broker = MemoryBroker::new();
        broker.set_rejecting(true).await;

        let result = Supervisor::new(Scripted::default(), broker.client("scripted"), fast_retry())
            .run(CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert!(broker.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_connection() {
        let broker = MemoryBroker::new();
        broker.set_available(false).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Supervisor::new(Scripted::default(), broker.client("scripted"), fast_retry())
            .run(cancel)
            .await;

        assert!(result.is_ok());
        assert!(broker.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_handler_still_disconnects() {
        let broker = MemoryBroker::new();
        let scripted = Scripted {
            panic_on_message: true,
            ..Scripted::default()
        };
        let handle =
            Supervisor::new(scripted.clone(), broker.client("scripted"), fast_retry()).start();
        wait_for_state(&broker, 1).await;

        let bytes = Envelope::new(MessageType::Wiegand, json!({})).encode().unwrap();
        broker.inject("credentials/seen", bytes).await;

        let result = handle.join().await;
        assert!(matches!(result, Err(Error::Panic(ref m)) if m == "handler blew up"));

        let states = broker.published("devices/scripted/state").await;
        assert_eq!(statuses(&states), vec!["connected", "disconnected"]);
        assert_eq!(scripted.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_message_is_skipped() {
        let broker = MemoryBroker::new();
        let scripted = Scripted::default();
        let handle =
            Supervisor::new(scripted.clone(), broker.client("scripted"), fast_retry()).start();
        wait_for_state(&broker, 1).await;

        broker.inject("credentials/seen", &b"not json"[..]).await;
        broker
            .inject("credentials/seen", &br#"{"version":2,"type":"wiegand","payload":{}}"#[..])
            .await;
        let good = Envelope::new(MessageType::Wiegand, json!({})).encode().unwrap();
        broker.inject("credentials/seen", good).await;

        for _ in 0..1000 {
            if scripted.messages.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(scripted.messages.load(Ordering::SeqCst), 1);
        assert!(!handle.is_finished());

        handle.terminate();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_reconnects() {
        let broker = MemoryBroker::new();
        let scripted = Scripted::default();
        let handle =
            Supervisor::new(scripted.clone(), broker.client("scripted"), fast_retry()).start();
        wait_for_state(&broker, 1).await;

        let lost = Envelope::new(MessageType::Wiegand, json!("lost")).encode().unwrap();
        broker.inject("credentials/seen", lost).await;
        wait_for_state(&broker, 3).await;

        handle.terminate();
        handle.join().await.unwrap();

        let states = broker.published("devices/scripted/state").await;
        assert_eq!(
            statuses(&states),
            vec!["connected", "disconnected", "connected", "disconnected"]
        );
        assert_eq!(scripted.connects.load(Ordering::SeqCst), 2);
    }
}
