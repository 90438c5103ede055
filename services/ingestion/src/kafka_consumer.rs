use crate::config::KafkaConfig;
use crate::router::{Delivered, IngestionRouter};
use anyhow::{Context, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Kafka consumer feeding push envelopes to the router.
///
/// Records are handled one at a time and committed only after the router
/// reports success. A failed record is routed again after
/// `redelivery_delay_ms` until it succeeds or the consumer shuts down, so an
/// uncommitted offset is never skipped.
pub struct KafkaIngestionConsumer {
    consumer: StreamConsumer,
    router: Arc<IngestionRouter>,
    topic: String,
    redelivery_delay: Duration,
}

impl KafkaIngestionConsumer {
    /// Create a new Kafka consumer for push envelopes
    pub fn new(config: &KafkaConfig, router: Arc<IngestionRouter>) -> Result<Self> {
        let consumer: StreamConsumer = client_config(config)
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.topic])
            .context("Failed to subscribe to event topic")?;

        info!(
            topic = %config.topic,
            group = %config.consumer_group,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer,
            router,
            topic: config.topic.clone(),
            redelivery_delay: config.redelivery_delay(),
        })
    }

    /// Consume until `shutdown` is cancelled
    #[instrument(skip(self, shutdown), fields(topic = %self.topic))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting ingestion Kafka consumer");

        let mut message_stream = self.consumer.stream();

        loop {
            let message_result = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = message_stream.next() => match next {
                    Some(result) => result,
                    None => break,
                },
            };

            match message_result {
                Ok(message) => {
                    if !self.process_message(&message, &shutdown).await {
                        // Shutdown while the record was still failing; leave it uncommitted
                        break;
                    }
                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                        warn!(error = %e, "Failed to commit offset");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    metrics::counter!("ingestion.kafka.errors").increment(1);
                }
            }
        }

        info!("Ingestion Kafka consumer stopped");
        Ok(())
    }

    /// Route one record, retrying on storage failure.
    ///
    /// Returns `false` if shutdown was requested before the record succeeded.
    #[instrument(skip(self, message, shutdown), fields(partition = message.partition(), offset = message.offset()))]
    async fn process_message(
        &self,
        message: &BorrowedMessage<'_>,
        shutdown: &CancellationToken,
    ) -> bool {
        let payload = message.payload().unwrap_or_default();
        let source = message_source(message.topic(), message.partition(), message.offset());

        let mut attempt: u32 = 1;
        loop {
            match self.router.route_envelope(payload, &source).await {
                Ok(delivered) => {
                    if let Delivered::Primary { key, .. } = &delivered {
                        debug!(key = %key, "Record stored");
                    }
                    return true;
                }
                Err(e) => {
                    metrics::counter!("ingestion.kafka.redeliveries").increment(1);
                    warn!(
                        error = %e,
                        attempt = attempt,
                        delay_ms = self.redelivery_delay.as_millis() as u64,
                        "Record failed; will route it again"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.redelivery_delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Build the consumer client configuration
fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("group.id", &config.consumer_group)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", config.session_timeout_ms.to_string());

    // Configure SSL if enabled
    if config.ssl_enabled {
        client_config.set("security.protocol", "SASL_SSL");
        if let Some(ref ca_location) = config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca_location);
        }
    }

    // Configure SASL if credentials provided
    if let (Some(ref username), Some(ref password)) =
        (&config.sasl_username, &config.sasl_password)
    {
        client_config
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    client_config
}

/// Source label recorded on every routed record
fn message_source(topic: &str, partition: i32, offset: i64) -> String {
    format!("kafka:{}/{}/{}", topic, partition, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka_config() -> KafkaConfig {
        KafkaConfig {
            bootstrap_servers: "localhost:9092".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_offsets_are_committed_manually() {
        let config = client_config(&kafka_config());

        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("group.id"), Some("ingestion-service"));
        assert_eq!(config.get("security.protocol"), None);
    }

    #[test]
    fn test_sasl_credentials_are_applied() {
        let mut kafka = kafka_config();
        kafka.ssl_enabled = true;
        kafka.sasl_username = Some("user".to_string());
        kafka.sasl_password = Some("secret".to_string());

        let config = client_config(&kafka);

        assert_eq!(config.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(config.get("sasl.username"), Some("user"));
    }

    #[test]
    fn test_message_source() {
        assert_eq!(
            message_source("clickstream-events", 3, 42),
            "kafka:clickstream-events/3/42"
        );
    }
}
