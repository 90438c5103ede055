//! Kafka publishing for generated events.
//!
//! Each event travels inside the same push envelope the ingestion service
//! accepts over HTTP, keyed by `event_id`.

use crate::config::KafkaConfig;
use crate::journey::ClickEvent;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use ingestion_service::PushEnvelope;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur while publishing
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to create producer: {0}")]
    CreationError(String),

    #[error("Failed to serialize event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to send message to topic {topic}: {message}")]
    SendError { topic: String, message: String },
}

/// Where generated events go
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ClickEvent) -> Result<(), PublishError>;
}

/// Build the envelope a generated event travels in
pub fn envelope_for(event: &ClickEvent) -> Result<PushEnvelope, PublishError> {
    let mut envelope = PushEnvelope::wrap(event, Some(event.event_id.clone()))?;
    envelope.message.publish_time = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    envelope
        .message
        .attributes
        .insert("event_type".to_string(), event.event_type.as_str().to_string());
    Ok(envelope)
}

/// Kafka-backed event sink
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaEventPublisher {
    /// Create a new publisher with the given configuration
    pub fn new(config: &KafkaConfig) -> Result<Self, PublishError> {
        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Creating Kafka producer"
        );

        let producer: FutureProducer = producer_config(config)
            .create()
            .map_err(|e| PublishError::CreationError(e.to_string()))?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: config.message_timeout(),
        })
    }
}

#[async_trait]
impl EventSink for KafkaEventPublisher {
    #[instrument(skip(self, event), fields(topic = %self.topic, event_id = %event.event_id))]
    async fn publish(&self, event: &ClickEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(&envelope_for(event)?)?;

        let record = FutureRecord::to(&self.topic)
            .key(&event.event_id)
            .payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| PublishError::SendError {
                topic: self.topic.clone(),
                message: e.to_string(),
            })?;

        debug!(
            partition = partition,
            offset = offset,
            event_type = %event.event_type,
            "Event published"
        );

        Ok(())
    }
}

fn producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("client.id", &config.client_id)
        .set("message.timeout.ms", config.message_timeout_ms.to_string())
        .set("acks", "all")
        .set("enable.idempotence", "true");

    client_config
}
