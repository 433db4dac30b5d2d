use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{error, info};

use super::messages::EventMessage;
use crate::events::{EventSink, RecorderEvent};

/// Subject prefix; the event kind is appended (`recorder.events.segment_finalized`)
pub const SUBJECT_PREFIX: &str = "recorder.events";

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    service: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, service: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, service })
    }

    pub fn subject_for(event: &RecorderEvent) -> String {
        format!("{}.{}", SUBJECT_PREFIX, event.kind())
    }

    /// Publish one event
    pub async fn publish_event(&self, event: RecorderEvent) -> Result<()> {
        let subject = Self::subject_for(&event);

        let message = EventMessage {
            service: self.service.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject, payload.into())
            .await
            .context("Failed to publish event")?;

        Ok(())
    }
}

/// Event sink that publishes to NATS without blocking the emitter
pub struct NatsSink {
    client: NatsClient,
}

impl NatsSink {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

impl EventSink for NatsSink {
    fn emit(&self, event: RecorderEvent) {
        let client = self.client.clone();

        tokio::spawn(async move {
            if let Err(e) = client.publish_event(event).await {
                error!("Failed to publish event to NATS: {}", e);
            }
        });
    }
}
