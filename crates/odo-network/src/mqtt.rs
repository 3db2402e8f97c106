//! MQTT bus client.
//!
//! # Architecture
//!
//! ```text
//! MqttBusClient ──publish/subscribe──> AsyncClient ──> EventLoop task ──(TCP)──> broker
//!       ▲                                                   │
//!       └──────────── mpsc<BusMessage> ◀── incoming PUBLISH ┘
//! ```
//!
//! `connect` drives the event loop itself until the broker answers the
//! CONNECT, so a refusal is reported to the caller instead of being retried
//! in the background. Once accepted, the event loop moves to its own task.
//! When the connection drops the task ends, `recv` reports
//! [`BusError::ConnectionLost`], and reconnecting is left to the caller.

use crate::{
    bus::{BusClient, BusMessage},
    error::BusError,
};
use bytes::Bytes;
use odo_core::constants::DEFAULT_MQTT_PORT;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Configuration for the MQTT client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    /// Broker host name or address
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Client identifier, unique per broker
    pub client_id: String,

    /// Keep-alive interval
    pub keep_alive: Duration,

    /// Bound on the CONNECT/CONNACK exchange
    pub connect_timeout: Duration,

    /// Depth of the request and delivery queues
    pub capacity: usize,
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_MQTT_PORT,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            capacity: 64,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// MQTT 3.1.1 client with QoS 1 delivery.
#[derive(Debug)]
pub struct MqttBusClient {
    config: MqttConfig,
    client: Option<AsyncClient>,
    rx: Option<mpsc::Receiver<BusMessage>>,
    task: Option<JoinHandle<()>>,
}

impl MqttBusClient {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
            rx: None,
            task: None,
        }
    }

    fn broker(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn client(&self) -> Result<&AsyncClient, BusError> {
        self.client.as_ref().ok_or(BusError::NotConnected)
    }
}

/// Poll until the broker answers CONNECT.
async fn handshake(eventloop: &mut EventLoop) -> Result<(), BusError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(BusError::Rejected(format!("{code:?}")));
            }
            Err(e) => return Err(BusError::Unreachable(e.to_string())),
        }
    }
}

/// Forward incoming publications until the connection drops.
async fn pump(mut eventloop: EventLoop, tx: mpsc::Sender<BusMessage>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BusMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection ended");
                break;
            }
        }
    }
}

impl BusClient for MqttBusClient {
    async fn connect(&mut self) -> Result<(), BusError> {
        if self.is_connected() {
            return Ok(());
        }

        info!(
            broker = %self.broker(),
            client_id = %self.config.client_id,
            "Connecting to MQTT broker"
        );

        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        let (client, mut eventloop) = AsyncClient::new(options, self.config.capacity);

        match tokio::time::timeout(self.config.connect_timeout, handshake(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BusError::Unreachable(format!(
                    "no CONNACK from {} within {}ms",
                    self.broker(),
                    self.config.connect_timeout.as_millis()
                )));
            }
        }

        let (tx, rx) = mpsc::channel(self.config.capacity);
        self.task = Some(tokio::spawn(pump(eventloop, tx)));
        self.client = Some(client);
        self.rx = Some(rx);

        info!(broker = %self.broker(), "Connected to MQTT broker");
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError> {
        debug!(filter, "Subscribing");
        self.client()?
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| BusError::ConnectionLost(e.to_string()))
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        self.client()?
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| BusError::ConnectionLost(e.to_string()))
    }

    async fn recv(&mut self) -> Result<BusMessage, BusError> {
        let rx = self.rx.as_mut().ok_or(BusError::NotConnected)?;
        match rx.recv().await {
            Some(message) => Ok(message),
            None => {
                self.client = None;
                self.rx = None;
                self.task = None;
                Err(BusError::ConnectionLost(format!(
                    "connection to {} closed",
                    self.broker()
                )))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), BusError> {
        self.rx = None;

        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "Disconnect request not delivered");
            }
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(1), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
            info!(broker = %self.broker(), "Disconnected from MQTT broker");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
