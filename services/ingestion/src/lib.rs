//! Clickstream Ingestion Service
//!
//! Receives clickstream events from a push-delivery transport, checks them,
//! and persists each one as a JSON object in a date-partitioned bucket
//! layout. Anything that cannot be decoded or checked is written to a
//! quarantine bucket with a diagnostic record.
//!
//! ## Features
//!
//! - **Push endpoint**: HTTP `POST /` accepting push envelopes, with health
//!   and readiness probes
//! - **Kafka source**: optional consumer carrying the same envelopes, with
//!   offsets committed only after the event is safely stored
//! - **Hive-style partitioning**: `event_type=<type>/year=/month=/day=/<event_id>.json`
//!   so re-delivered events overwrite instead of duplicating
//! - **Quarantine**: rejected messages kept under `failed/` with the error text
//!   and the best available rendering of the payload
//!
//! ## Architecture
//!
//! ```text
//!  HTTP push          Kafka topic
//! ┌──────────────┐   ┌──────────────┐
//! │ POST /       │   │ clickstream- │
//! │              │   │ events       │
//! └──────────────┘   └──────────────┘
//!        │                  │
//!        └────────┬─────────┘
//!                 ▼
//!         ┌──────────────┐          S3 (primary)
//!         │ Decoder      │         ┌──────────────────┐
//!         └──────────────┘         │ event_type=.../  │
//!                 │                │   year=/month=/  │
//!                 ▼                │   day=/          │
//!         ┌──────────────┐   ok    └──────────────────┘
//!         │ Validator    │───────────────▲
//!         └──────────────┘               │
//!                 │ rejected       ┌──────────────┐
//!                 ▼                │ Partitioner  │
//!          S3 (quarantine)         └──────────────┘
//!         ┌──────────────────┐
//!         │ failed/year=/... │
//!         └──────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod decoder;
pub mod destination;
pub mod envelope;
pub mod event;
pub mod kafka_consumer;
pub mod partition;
pub mod router;
pub mod s3_store;
pub mod storage;
pub mod validator;

pub use config::Config;
pub use decoder::{DecodeError, EventDocument};
pub use destination::{Destination, PrimaryRouting};
pub use envelope::{MessageMetadata, PushEnvelope, PushMessage, RawMessage};
pub use event::{Event, EventTimestamp, RequiredFields};
pub use kafka_consumer::KafkaIngestionConsumer;
pub use partition::{PartitionKey, PartitionLayout};
pub use router::{Delivered, IngestionRouter, QuarantineRecord, RouteError, RouteFailure};
pub use s3_store::S3ObjectStore;
pub use storage::{MemoryObjectStore, ObjectStore, StorageError, StorageWriter};
pub use validator::{Rejection, UnknownDestinationError, ValidationError, Validator};
