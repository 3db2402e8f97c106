//! RFID read/write station adapter.
//!
//! Listens on the seen and selected credential topics, routes each
//! credential through the [`Router`], and writes the accepted ones with the
//! [`WritePipeline`]. The published state carries the current mode and
//! target.
//!
//! The bus delivers at least once. A credential identical to the last one
//! written from the same topic is a redelivery and is not written again.

use crate::pipeline::WritePipeline;
use crate::router::Router;
use crate::supervisor::{Adapter, Outbox};
use odo_core::{Credential, DeviceStatus, Mode, Result, Target};
use odo_hardware::CommandDriver;
use odo_network::BusClient;
use odo_protocol::{CommandPayload, CredentialTopics, Envelope, MessageType};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Adapter driving a [`CommandDriver`] to write credentials.
#[derive(Debug)]
pub struct EncoderAdapter<D> {
    name: String,
    driver: D,
    router: Router,
    topics: CredentialTopics,
    pipeline: WritePipeline,
    last_written: Option<(String, Credential)>,
}

impl<D: CommandDriver> EncoderAdapter<D> {
    pub fn new(name: impl Into<String>, driver: D, topics: CredentialTopics) -> Self {
        Self {
            name: name.into(),
            driver,
            router: Router::default(),
            pipeline: WritePipeline::new(topics.written.clone()),
            topics,
            last_written: None,
        }
    }

    pub fn with_routing(mut self, mode: Mode, target: Target) -> Self {
        self.router = Router::new(mode, target);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

impl<D: CommandDriver> Adapter for EncoderAdapter<D> {
    type Details = Router;

    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topics.seen.clone(), self.topics.selected.clone()]
    }

    fn details(&self) -> Router {
        self.router
    }

    async fn connect(&mut self) -> Result<()> {
        self.driver.open().await?;
        info!(
            adapter = %self.name,
            mode = %self.router.mode(),
            target = %self.router.target(),
            "Client connected"
        );
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if self.driver.is_open() {
            self.driver.close().await?;
        }
        Ok(())
    }

    async fn on_message<B: BusClient>(
        &mut self,
        topic: &str,
        envelope: Envelope<Value>,
        outbox: &mut Outbox<'_, B>,
    ) -> Result<()> {
        let route = self.router.route_topic(&self.topics, topic);
        if route.changed {
            outbox
                .publish_state(DeviceStatus::Connected, self.router)
                .await?;
        }
        if !route.accepted {
            debug!(
                adapter = %self.name,
                topic,
                mode = %self.router.mode(),
                "Credential not routed"
            );
            return Ok(());
        }

        if envelope.kind != MessageType::Wiegand {
            warn!(adapter = %self.name, topic, kind = %envelope.kind, "Unexpected message type");
            return Ok(());
        }

        let credential: Credential = envelope.into_payload()?;
        if self
            .last_written
            .as_ref()
            .is_some_and(|(last_topic, last)| last_topic == topic && *last == credential)
        {
            info!(adapter = %self.name, topic, %credential, "Redelivered credential ignored");
            return Ok(());
        }

        let status = self
            .pipeline
            .write(&mut self.driver, &credential, self.router.target(), outbox)
            .await?;

        info!(adapter = %self.name, %credential, %status, "Write finished");
        self.last_written = Some((topic.to_string(), credential));
        Ok(())
    }

    async fn on_command<B: BusClient>(
        &mut self,
        command: CommandPayload,
        outbox: &mut Outbox<'_, B>,
    ) -> Result<()> {
        if self.router.apply_command(&command)? {
            outbox
                .publish_state(DeviceStatus::Connected, self.router)
                .await?;
        }
        Ok(())
    }
}
