//! In-process broker.
//!
//! Every [`MemoryBusClient`] created from the same [`MemoryBroker`] shares its
//! subscription table. The broker also records every publication so tests can
//! assert on what went over the bus.
//!
//! # Fault Simulation
//!
//! ```text
//! set_available(false)   connect → Unreachable, open sessions → ConnectionLost
//! set_rejecting(true)    connect → Rejected
//! set_duplicate(true)    every message is delivered twice
//! ```

use crate::{
    bus::{BusClient, BusMessage, topic_matches},
    error::BusError,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

#[derive(Debug)]
struct Session {
    id: u64,
    filters: Vec<String>,
    tx: mpsc::UnboundedSender<BusMessage>,
}

#[derive(Debug)]
struct BrokerState {
    available: bool,
    rejecting: bool,
    duplicate: bool,
    next_id: u64,
    sessions: Vec<Session>,
    history: Vec<BusMessage>,
}

impl BrokerState {
    fn route(&mut self, message: BusMessage) {
        let copies = if self.duplicate { 2 } else { 1 };

        self.sessions.retain(|session| {
            if !session.filters.iter().any(|f| topic_matches(f, &message.topic)) {
                return true;
            }
            (0..copies).all(|_| session.tx.send(message.clone()).is_ok())
        });

        self.history.push(message);
    }
}

/// Shared in-memory broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                available: true,
                rejecting: false,
                duplicate: false,
                next_id: 0,
                sessions: Vec::new(),
                history: Vec::new(),
            })),
        }
    }

    /// Create an unconnected client of this broker.
    pub fn client(&self, name: impl Into<String>) -> MemoryBusClient {
        MemoryBusClient {
            broker: self.clone(),
            name: name.into(),
            session: None,
            rx: None,
        }
    }

    /// Take the broker down or bring it back.
    ///
    /// Going down drops every open session.
    pub async fn set_available(&self, available: bool) {
        let mut state = self.state.lock().await;
        state.available = available;
        if !available {
            state.sessions.clear();
        }
    }

    /// Refuse (or accept again) new sessions.
    pub async fn set_rejecting(&self, rejecting: bool) {
        self.state.lock().await.rejecting = rejecting;
    }

    /// Deliver every message twice, as an at-least-once broker may.
    pub async fn set_duplicate(&self, duplicate: bool) {
        self.state.lock().await.duplicate = duplicate;
    }

    /// Publish without a client session.
    pub async fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        self.state
            .lock()
            .await
            .route(BusMessage::new(topic, payload));
    }

    /// Every message published on `topic` so far, in order.
    pub async fn published(&self, topic: &str) -> Vec<BusMessage> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Every message published so far, in order.
    pub async fn history(&self) -> Vec<BusMessage> {
        self.state.lock().await.history.clone()
    }

    /// Number of open sessions.
    pub async fn sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

/// Client of a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryBusClient {
    broker: MemoryBroker,
    name: String,
    session: Option<u64>,
    rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
}

impl MemoryBusClient {
    /// Run `f` against this client's live session.
    ///
    /// A session the broker dropped is forgotten so the next `connect` opens
    /// a new one.
    async fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut BrokerState, u64) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let id = self.session.ok_or(BusError::NotConnected)?;
        let mut state = self.broker.state.lock().await;

        if !state.available || !state.sessions.iter().any(|s| s.id == id) {
            drop(state);
            self.session = None;
            self.rx = None;
            return Err(BusError::ConnectionLost(format!(
                "{} session dropped by broker",
                self.name
            )));
        }

        f(&mut state, id)
    }
}

impl BusClient for MemoryBusClient {
    async fn connect(&mut self) -> Result<(), BusError> {
        if self.is_connected() {
            return Ok(());
        }

        let mut state = self.broker.state.lock().await;
        if !state.available {
            return Err(BusError::Unreachable("memory broker is down".to_string()));
        }
        if state.rejecting {
            return Err(BusError::Rejected(format!("{} not authorized", self.name)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_id;
        state.next_id += 1;
        state.sessions.push(Session {
            id,
            filters: Vec::new(),
            tx,
        });
        drop(state);

        debug!(client = %self.name, session = id, "Connected to memory broker");
        self.session = Some(id);
        self.rx = Some(rx);
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError> {
        self.with_session(|state, id| {
            if let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) {
                session.filters.push(filter.to_string());
            }
            Ok(())
        })
        .await
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        trace!(client = %self.name, topic, bytes = payload.len(), "Publish");
        self.with_session(|state, _| {
            state.route(BusMessage::new(topic, payload));
            Ok(())
        })
        .await
    }

    async fn recv(&mut self) -> Result<BusMessage, BusError> {
        let rx = self.rx.as_mut().ok_or(BusError::NotConnected)?;
        match rx.recv().await {
            Some(message) => Ok(message),
            None => {
                self.session = None;
                self.rx = None;
                Err(BusError::ConnectionLost(format!(
                    "{} session dropped by broker",
                    self.name
                )))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), BusError> {
        if let Some(id) = self.session.take() {
            self.broker
                .state
                .lock()
                .await
                .sessions
                .retain(|s| s.id != id);
            debug!(client = %self.name, session = id, "Disconnected from memory broker");
        }
        self.rx = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}
