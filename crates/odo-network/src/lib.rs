//! Message bus layer for odo.
//!
//! Adapters never talk to each other directly: every credential, state, and
//! command travels over a publish/subscribe bus. This crate defines the client
//! contract ([`BusClient`]) and two implementations:
//!
//! - **MqttBusClient**: MQTT 3.1.1 over TCP, for deployments
//! - **MemoryBroker / MemoryBusClient**: in-process broker, for tests and
//!   single-process setups. It can simulate an unreachable broker, a broker
//!   rejecting clients, and duplicate delivery.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use odo_network::{BusClient, MemoryBroker};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), odo_network::BusError> {
//! let broker = MemoryBroker::new();
//! let mut encoder = broker.client("proxmark3");
//! let mut capture = broker.client("espkey");
//!
//! encoder.connect().await?;
//! encoder.subscribe("credentials/seen").await?;
//! capture.connect().await?;
//!
//! capture.publish("credentials/seen", Bytes::from_static(b"{}")).await?;
//! let message = encoder.recv().await?;
//! assert_eq!(message.topic, "credentials/seen");
//! # Ok(())
//! # }
//! ```

mod bus;
mod error;
mod memory;
mod mqtt;

pub use bus::{BusClient, BusMessage, topic_matches};
pub use error::BusError;
pub use memory::{MemoryBroker, MemoryBusClient};
pub use mqtt::{MqttBusClient, MqttConfig};
