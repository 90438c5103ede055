use crate::config::S3Config;
use crate::storage::{ObjectStore, StorageError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use tracing::{debug, info};

/// S3-backed object store.
///
/// One client is built at startup and shared by every invocation.
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 object store initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size_bytes = body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Write {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket = %bucket, key = %key, size_bytes = size_bytes, "Object uploaded to S3");
        Ok(())
    }

    async fn check_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable {
                bucket: bucket.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })
    }
}
