//! Object storage seam and the JSON writer built on it.

use crate::destination::Destination;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument};

/// Content type declared on every object the writer persists
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Substrate-level write failure
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to serialize document for {bucket}/{key}: {source}")]
    Serialize {
        bucket: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {bucket}/{key}: {reason}")]
    Write {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Bucket {bucket} is not reachable: {reason}")]
    Unavailable { bucket: String, reason: String },
}

/// Minimal object store interface used by the router.
///
/// Implementations must not retry: redelivery is the transport's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` at `bucket/key`, replacing any existing object
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Check that a bucket can be reached
    async fn check_bucket(&self, bucket: &str) -> Result<(), StorageError>;
}

/// Serializes documents to JSON and persists them at a destination
#[derive(Clone)]
pub struct StorageWriter {
    store: Arc<dyn ObjectStore>,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Persist `document` as JSON at `destination.bucket/key`
    #[instrument(skip(self, document), fields(destination = %destination, key = %key))]
    pub async fn write_json<T>(
        &self,
        destination: &Destination,
        key: &str,
        document: &T,
    ) -> Result<(), StorageError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let body = serde_json::to_vec(document).map_err(|source| StorageError::Serialize {
            bucket: destination.bucket().to_string(),
            key: key.to_string(),
            source,
        })?;
        let size_bytes = body.len();

        let started = Instant::now();
        let result = self
            .store
            .put_object(destination.bucket(), key, body, JSON_CONTENT_TYPE)
            .await;

        metrics::histogram!(
            "ingestion.write.duration_seconds",
            "destination" => destination.kind()
        )
        .record(started.elapsed().as_secs_f64());

        if let Err(e) = result {
            metrics::counter!("ingestion.storage.errors", "destination" => destination.kind())
                .increment(1);
            return Err(e);
        }

        debug!(size_bytes = size_bytes, "Object written");
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

/// An object as the in-memory store holds it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl StoredObject {
    /// Body parsed as JSON
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

/// In-process object store for tests and local runs.
///
/// Buckets can be marked as failing to simulate substrate outages.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    failing_buckets: RwLock<HashSet<String>>,
    put_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `bucket` fail
    pub fn fail_writes_to(&self, bucket: impl Into<String>) {
        self.failing_buckets.write().insert(bucket.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Number of objects across all buckets
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `put_object` calls, overwrites included
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.failing_buckets.read().contains(bucket) {
            return Err(StorageError::Write {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "simulated outage".to_string(),
            });
        }

        self.objects.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn check_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if self.failing_buckets.read().contains(bucket) {
            return Err(StorageError::Unavailable {
                bucket: bucket.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_json_declares_content_type() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|bucket, key, body, content_type| {
                bucket.to_string() == "events"
                    && key.to_string() == "year=2026/month=01/day=19/e1.json"
                    && body.as_slice() == br#"{"event_id":"e1"}"#
                    && content_type.to_string() == JSON_CONTENT_TYPE
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let writer = StorageWriter::new(Arc::new(store));
        writer
            .write_json(
                &Destination::Primary("events".to_string()),
                "year=2026/month=01/day=19/e1.json",
                &json!({"event_id": "e1"}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_json_surfaces_substrate_errors() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .times(1)
            .returning(|bucket, key, _, _| {
                Err(StorageError::Write {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: "AccessDenied".to_string(),
                })
            });

        let writer = StorageWriter::new(Arc::new(store));
        let err = writer
            .write_json(&Destination::Primary("events".to_string()), "k.json", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to write events/k.json: AccessDenied");
    }

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryObjectStore::new();
        store
            .put_object("b", "k", b"1".to_vec(), JSON_CONTENT_TYPE)
            .await
            .unwrap();
        store
            .put_object("b", "k", b"2".to_vec(), JSON_CONTENT_TYPE)
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.put_calls(), 2);
        assert_eq!(store.get("b", "k").unwrap().body, b"2");
    }

    #[tokio::test]
    async fn test_memory_store_simulated_outage() {
        let store = MemoryObjectStore::new();
        store.fail_writes_to("b");

        assert!(store
            .put_object("b", "k", vec![], JSON_CONTENT_TYPE)
            .await
            .is_err());
        assert!(store.check_bucket("b").await.is_err());
        assert!(store.is_empty());
    }
}
