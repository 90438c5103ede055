//! The ingestion router: decode → validate → partition → persist.
//!
//! Data problems (undecodable payloads, missing fields, unroutable types)
//! never fail an invocation; the message is written to quarantine with a
//! diagnostic record instead. Storage problems always fail it, so the
//! transport redelivers:
//!
//! ```text
//!                 ┌────────────┐  ok   ┌────────────┐  ok   ┌───────────┐
//!  RawMessage ───▶│  Decoder   │──────▶│ Validator  │──────▶│ Partition │──▶ primary write
//!                 └────────────┘       └────────────┘       └───────────┘       │ err
//!                       │ err                │ err                               ▼
//!                       └──────────┬─────────┘                        RouteError::PrimaryWrite
//!                                  ▼
//!                          quarantine write ──err──▶ RouteError::QuarantineWrite (event lost)
//! ```

use crate::config::{ConfigError, RoutingConfig};
use crate::decoder::{self, DecodeError};
use crate::destination::{Destination, PrimaryRouting};
use crate::envelope::RawMessage;
use crate::event::Event;
use crate::partition::{self, PartitionKey, PartitionLayout};
use crate::storage::{ObjectStore, StorageError, StorageWriter};
use crate::validator::{Rejection, UnknownDestinationError, ValidationError, Validator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Diagnostic document written to quarantine
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuarantineRecord {
    pub error: String,
    pub original_payload: Value,
}

/// The stage that turned a message away, with its typed cause
#[derive(Error, Debug)]
pub enum RouteFailure {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnknownDestination(#[from] UnknownDestinationError),
}

impl RouteFailure {
    /// Label used in logs and metrics
    pub fn stage(&self) -> &'static str {
        match self {
            RouteFailure::Decode(_) => "decode",
            RouteFailure::Validation(_) => "validation",
            RouteFailure::UnknownDestination(_) => "unknown_destination",
        }
    }
}

impl From<Rejection> for RouteFailure {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Invalid(e) => RouteFailure::Validation(e),
            Rejection::UnknownDestination(e) => RouteFailure::UnknownDestination(e),
        }
    }
}

/// Terminal outcome of a successful invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Delivered {
    /// Event stored in its primary location
    Primary { bucket: String, key: String },
    /// Message stored in quarantine
    Quarantine {
        bucket: String,
        key: String,
        stage: &'static str,
        error: String,
    },
    /// Message rejected with no quarantine bucket configured; logged only
    Discarded { stage: &'static str, error: String },
}

/// Invocation failure. The transport must redeliver the message.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Primary write failed: {0}")]
    PrimaryWrite(#[source] StorageError),

    #[error("Quarantine write failed after {stage} failure, message lost: {source}")]
    QuarantineWrite {
        stage: &'static str,
        #[source]
        source: StorageError,
    },
}

/// Routes messages to primary or quarantine storage.
///
/// Holds no per-message state; share one instance behind an `Arc`.
pub struct IngestionRouter {
    writer: StorageWriter,
    routing: PrimaryRouting,
    validator: Validator,
    quarantine: Option<Destination>,
    layout: PartitionLayout,
}

impl IngestionRouter {
    /// Build a router over an already-connected store
    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        config: &RoutingConfig,
    ) -> Result<Self, ConfigError> {
        let routing = PrimaryRouting::from_config(config)?;

        let validator = match routing.known_event_types() {
            Some(known) => Validator::with_known_event_types(known),
            None => Validator::new(),
        };

        let layout = if config.partition_by_event_type {
            PartitionLayout::EventTypeThenDate
        } else {
            PartitionLayout::DateOnly
        };

        let quarantine = config
            .quarantine()
            .map(|bucket| Destination::Quarantine(bucket.to_string()));

        if quarantine.is_none() {
            warn!("No quarantine bucket configured; rejected messages will only be logged");
        }

        Ok(Self {
            writer: StorageWriter::new(store),
            routing,
            validator,
            quarantine,
            layout,
        })
    }

    /// Route a push envelope body exactly as the transport delivered it
    pub async fn route_envelope(&self, body: &[u8], source: &str) -> Result<Delivered, RouteError> {
        let now = Utc::now();
        match RawMessage::from_envelope_slice(body, source) {
            Ok(message) => self.route_at(message, now).await,
            Err(e) => {
                let payload = e.original_payload();
                self.quarantine(e.into(), payload, None, now).await
            }
        }
    }

    /// Route one message
    pub async fn route(&self, message: RawMessage) -> Result<Delivered, RouteError> {
        self.route_at(message, Utc::now()).await
    }

    /// Route one message with an explicit processing time.
    ///
    /// `now` only affects quarantine keys; primary keys come from the event.
    #[instrument(
        skip(self, message, now),
        fields(source = %message.metadata.source, message_id = ?message.metadata.message_id)
    )]
    pub async fn route_at(
        &self,
        message: RawMessage,
        now: DateTime<Utc>,
    ) -> Result<Delivered, RouteError> {
        let message_id = message.metadata.message_id.as_deref();

        let document = match decoder::decode(&message.data) {
            Ok(document) => document,
            Err(e) => {
                let payload = e.original_payload();
                return self.quarantine(e.into(), payload, message_id, now).await;
            }
        };

        let fields = match self.validator.validate(&document) {
            Ok(fields) => fields,
            Err(rejection) => {
                let payload = Value::Object(document);
                return self
                    .quarantine(rejection.into(), payload, message_id, now)
                    .await;
            }
        };

        let event = Event::new(fields, document);

        let Some(destination) = self.routing.resolve(&event.event_type) else {
            let failure = RouteFailure::UnknownDestination(UnknownDestinationError {
                event_type: event.event_type.clone(),
            });
            let payload = Value::Object(event.into_document());
            return self.quarantine(failure, payload, message_id, now).await;
        };

        self.deliver_primary(event, destination).await
    }

    async fn deliver_primary(
        &self,
        event: Event,
        destination: Destination,
    ) -> Result<Delivered, RouteError> {
        let partition = PartitionKey::for_event(&event, self.layout);
        let key = partition::primary_object_key(&partition, &event.event_id);

        // Storage failures here are infrastructure, not data quality: never quarantine
        if let Err(e) = self
            .writer
            .write_json(&destination, &key, event.document())
            .await
        {
            error!(
                error = %e,
                event_id = %event.event_id,
                bucket = %destination.bucket(),
                key = %key,
                "Primary write failed; message must be redelivered"
            );
            return Err(RouteError::PrimaryWrite(e));
        }

        metrics::counter!("ingestion.events.delivered", "destination" => "primary").increment(1);

        info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            bucket = %destination.bucket(),
            key = %key,
            "Event stored"
        );

        Ok(Delivered::Primary {
            bucket: destination.bucket().to_string(),
            key,
        })
    }

    /// Divert a rejected message to quarantine
    async fn quarantine(
        &self,
        failure: RouteFailure,
        original_payload: Value,
        message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Delivered, RouteError> {
        let stage = failure.stage();
        let error_text = failure.to_string();

        let Some(destination) = &self.quarantine else {
            metrics::counter!("ingestion.events.discarded").increment(1);
            warn!(
                stage = stage,
                error = %error_text,
                payload = %original_payload,
                "Message rejected; no quarantine bucket configured, discarding"
            );
            return Ok(Delivered::Discarded {
                stage,
                error: error_text,
            });
        };

        let key = partition::quarantine_object_key(now, message_id);
        let record = QuarantineRecord {
            error: error_text.clone(),
            original_payload,
        };

        if let Err(e) = self.writer.write_json(destination, &key, &record).await {
            metrics::counter!("ingestion.events.lost").increment(1);
            error!(
                error = %e,
                stage = stage,
                rejection = %error_text,
                bucket = %destination.bucket(),
                key = %key,
                "Quarantine write failed; message is lost unless redelivered"
            );
            return Err(RouteError::QuarantineWrite { stage, source: e });
        }

        metrics::counter!("ingestion.events.quarantined", "stage" => stage).increment(1);

        warn!(
            stage = stage,
            error = %error_text,
            bucket = %destination.bucket(),
            key = %key,
            "Message quarantined"
        );

        Ok(Delivered::Quarantine {
            bucket: destination.bucket().to_string(),
            key,
            stage,
            error: error_text,
        })
    }

    /// Check that every configured bucket is reachable
    pub async fn check_destinations(&self) -> Result<(), StorageError> {
        for bucket in self.routing.buckets() {
            self.writer.store().check_bucket(bucket).await?;
        }
        if let Some(quarantine) = &self.quarantine {
            self.writer.store().check_bucket(quarantine.bucket()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{MessageMetadata, PushEnvelope};
    use crate::storage::{MemoryObjectStore, MockObjectStore};
    use chrono::TimeZone;
    use serde_json::json;

    fn single_bucket_config() -> RoutingConfig {
        RoutingConfig {
            primary_bucket: Some("events".to_string()),
            quarantine_bucket: Some("quarantine".to_string()),
            ..Default::default()
        }
    }

    fn message(event: &Value) -> RawMessage {
        let envelope = PushEnvelope::wrap(event, None).unwrap();
        RawMessage::from_envelope(envelope, "test")
    }

    fn processing_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_valid_event_goes_to_primary() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let event = json!({
            "event_type": "purchase",
            "timestamp": "2026-01-19T12:00:00",
            "event_id": "abc-123",
            "user_id": "u1"
        });

        let delivered = router.route_at(message(&event), processing_time()).await.unwrap();

        let key = "event_type=purchase/year=2026/month=01/day=19/abc-123.json";
        assert_eq!(
            delivered,
            Delivered::Primary {
                bucket: "events".to_string(),
                key: key.to_string()
            }
        );

        let stored = store.get("events", key).unwrap();
        assert_eq!(stored.content_type, "application/json");
        assert_eq!(stored.json().unwrap(), event);
        assert!(store.keys("quarantine").is_empty());
    }

    #[tokio::test]
    async fn test_missing_timestamp_goes_to_quarantine() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let event = json!({"event_type": "page_view", "event_id": "bad-123"});
        let delivered = router.route_at(message(&event), processing_time()).await.unwrap();

        let Delivered::Quarantine { bucket, key, stage, .. } = delivered.clone() else {
            panic!("expected quarantine, got {delivered:?}");
        };
        assert_eq!(bucket, "quarantine");
        assert_eq!(stage, "validation");
        assert!(key.starts_with("failed/year=2026/month=10/day=16/"));
        assert!(key.ends_with("_error.json"));

        let record = store.get("quarantine", &key).unwrap().json().unwrap();
        assert_eq!(
            record,
            json!({
                "error": "Missing 'timestamp' field",
                "original_payload": {"event_type": "page_view", "event_id": "bad-123"}
            })
        );
        assert!(store.keys("events").is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_data_is_quarantined_with_sentinel() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let raw = RawMessage::new("%%% not base64 %%%", MessageMetadata::default());
        let delivered = router.route_at(raw, processing_time()).await.unwrap();

        let Delivered::Quarantine { key, stage, .. } = delivered.clone() else {
            panic!("expected quarantine, got {delivered:?}");
        };
        assert_eq!(stage, "decode");

        let record = store.get("quarantine", &key).unwrap().json().unwrap();
        assert_eq!(record["original_payload"], json!("parse_error"));
        assert!(record["error"]
            .as_str()
            .unwrap()
            .starts_with("Message data is not valid base64"));
    }

    #[tokio::test]
    async fn test_unknown_type_with_registry() {
        let mut config = single_bucket_config();
        config.primary_bucket = None;
        config
            .buckets
            .insert("purchase".to_string(), "purchases".to_string());

        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &config).unwrap();

        let event = json!({
            "event_type": "wishlist_add",
            "timestamp": "2026-01-19T12:00:00",
            "event_id": "w1"
        });
        let delivered = router.route_at(message(&event), processing_time()).await.unwrap();

        assert!(matches!(
            delivered,
            Delivered::Quarantine { stage: "unknown_destination", .. }
        ));
        assert!(store.keys("purchases").is_empty());
    }

    #[tokio::test]
    async fn test_primary_failure_propagates_without_quarantine() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|bucket, _, _, _| bucket.to_string() == "events")
            .times(1)
            .returning(|bucket, key, _, _| {
                Err(StorageError::Write {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: "connection reset".to_string(),
                })
            });
        store
            .expect_put_object()
            .withf(|bucket, _, _, _| bucket.to_string() == "quarantine")
            .never();

        let router = IngestionRouter::from_config(Arc::new(store), &single_bucket_config()).unwrap();

        let event = json!({
            "event_type": "purchase",
            "timestamp": "2026-01-19T12:00:00",
            "event_id": "abc-123"
        });
        let err = router.route_at(message(&event), processing_time()).await.unwrap_err();

        assert!(matches!(err, RouteError::PrimaryWrite(_)));
    }

    #[tokio::test]
    async fn test_quarantine_failure_propagates() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_writes_to("quarantine");
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let event = json!({"event_type": "page_view", "event_id": "bad-123"});
        let err = router.route_at(message(&event), processing_time()).await.unwrap_err();

        assert!(matches!(
            err,
            RouteError::QuarantineWrite { stage: "validation", .. }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_without_quarantine_bucket_messages_are_discarded() {
        let mut config = single_bucket_config();
        config.quarantine_bucket = None;

        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &config).unwrap();

        let event = json!({"event_type": "page_view", "event_id": "bad-123"});
        let delivered = router.route_at(message(&event), processing_time()).await.unwrap();

        assert!(matches!(delivered, Delivered::Discarded { stage: "validation", .. }));
        assert_eq!(store.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_quarantined() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let delivered = router.route_envelope(b"hello", "http").await.unwrap();

        let Delivered::Quarantine { key, stage, .. } = delivered.clone() else {
            panic!("expected quarantine, got {delivered:?}");
        };
        assert_eq!(stage, "decode");
        let record = store.get("quarantine", &key).unwrap().json().unwrap();
        assert_eq!(record["original_payload"], json!("hello"));
    }

    #[tokio::test]
    async fn test_message_id_names_quarantine_object() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let envelope = PushEnvelope::wrap(
            &json!({"event_type": "page_view", "event_id": "bad-123"}),
            Some("msg-42".to_string()),
        )
        .unwrap();

        for _ in 0..2 {
            router
                .route_at(RawMessage::from_envelope(envelope.clone(), "test"), processing_time())
                .await
                .unwrap();
        }

        assert_eq!(
            store.keys("quarantine"),
            ["failed/year=2026/month=10/day=16/msg-42_error.json"]
        );
    }

    #[tokio::test]
    async fn test_large_integers_are_stored_exactly() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let raw = br#"{"event_type":"purchase","timestamp":"2026-01-19T12:00:00","event_id":"big-1","order_no":123456789012345678901234567890,"price":65.10}"#;
        let envelope = PushEnvelope::from_bytes(raw, None);

        router
            .route_at(RawMessage::from_envelope(envelope, "test"), processing_time())
            .await
            .unwrap();

        let stored = store
            .get("events", "event_type=purchase/year=2026/month=01/day=19/big-1.json")
            .unwrap();
        assert_eq!(stored.body, raw.to_vec());
    }

    #[tokio::test]
    async fn test_ids_differing_in_punctuation_do_not_collide() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        for event_id in ["order.1", "order_1", "order/1", "order 1"] {
            let event = json!({
                "event_type": "purchase",
                "timestamp": "2026-01-19T12:00:00",
                "event_id": event_id
            });
            router.route_at(message(&event), processing_time()).await.unwrap();
        }

        assert_eq!(store.keys("events").len(), 4);
    }

    #[tokio::test]
    async fn test_anonymous_failures_get_separate_quarantine_objects() {
        let store = Arc::new(MemoryObjectStore::new());
        let router = IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

        let event = json!({"event_type": "page_view", "event_id": "bad-123"});
        for _ in 0..2 {
            router.route_at(message(&event), processing_time()).await.unwrap();
        }

        assert_eq!(store.keys("quarantine").len(), 2);
    }

    #[tokio::test]
    async fn test_non_object_payloads_are_quarantined_as_text() {
        for payload in ["this is not json", "[1,2]"] {
            let store = Arc::new(MemoryObjectStore::new());
            let router =
                IngestionRouter::from_config(store.clone(), &single_bucket_config()).unwrap();

            let envelope = PushEnvelope::from_bytes(payload.as_bytes(), None);
            let delivered = router
                .route_at(RawMessage::from_envelope(envelope, "test"), processing_time())
                .await
                .unwrap();

            let Delivered::Quarantine { key, stage, .. } = delivered.clone() else {
                panic!("expected quarantine, got {delivered:?}");
            };
            assert_eq!(stage, "decode");
            assert_eq!(store.put_calls(), 1);

            let record = store.get("quarantine", &key).unwrap().json().unwrap();
            assert_eq!(record["original_payload"], json!(payload));
        }
    }

    #[test]
    fn test_route_failure_stages() {
        let failure: RouteFailure = ValidationError::MissingField("timestamp").into();
        assert_eq!(failure.stage(), "validation");
        assert_eq!(failure.to_string(), "Missing 'timestamp' field");
    }
}
