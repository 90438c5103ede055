use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or checking configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Main configuration for the ingestion service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object storage client configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Bucket routing configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Push endpoint configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Kafka source (disabled when absent)
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Where events land.
///
/// Exactly one of `primary_bucket` or `buckets` must be set. A non-empty
/// `buckets` map is the known-destinations registry: event types missing
/// from it are quarantined.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Single bucket for every event type (`PRIMARY_BUCKET`)
    #[serde(default)]
    pub primary_bucket: Option<String>,
    /// event_type -> bucket (`BUCKET_<EVENT_TYPE>`)
    #[serde(default)]
    pub buckets: HashMap<String, String>,
    /// Quarantine bucket (`QUARANTINE_BUCKET`); quarantine is skipped when unset
    #[serde(default)]
    pub quarantine_bucket: Option<String>,
    /// Prefix primary keys with `event_type=<type>/`
    #[serde(default = "default_true")]
    pub partition_by_event_type: bool,
}

/// Push endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Kafka consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: String,
    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic carrying push envelopes
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Enable SSL
    #[serde(default)]
    pub ssl_enabled: bool,
    /// SSL CA certificate path
    pub ssl_ca_location: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Auto offset reset policy
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Delay before a failed record is fetched again
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
}

// Default value functions
fn default_service_name() -> String {
    "ingestion-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_consumer_group() -> String {
    "ingestion-service".to_string()
}

fn default_topic() -> String {
    "clickstream-events".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_redelivery_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("service.name", "ingestion-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/ingestion").required(false))
            .add_source(config::File::with_name("/etc/clickstream/ingestion").required(false))
            // INGESTION__S3__REGION -> s3.region
            .add_source(
                config::Environment::with_prefix("INGESTION")
                    .separator("__")
                    .try_parsing(true),
            );

        // PRIMARY_BUCKET / QUARANTINE_BUCKET / BUCKET_<TYPE> win over everything else
        for (key, value) in bucket_overrides(std::env::vars()) {
            builder = builder.set_override(key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.routing.validate()?;
        Ok(config)
    }
}

/// Map the flat bucket variables onto `routing.*` keys.
///
/// Empty values are ignored so an unset `BUCKET_AD_CLICK=` does not register
/// a destination with no bucket.
pub fn bucket_overrides<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides = Vec::new();

    for (name, value) in vars {
        if value.trim().is_empty() {
            continue;
        }
        match name.as_str() {
            "PRIMARY_BUCKET" => overrides.push(("routing.primary_bucket".to_string(), value)),
            "QUARANTINE_BUCKET" => {
                overrides.push(("routing.quarantine_bucket".to_string(), value))
            }
            _ => {
                if let Some(event_type) = name.strip_prefix("BUCKET_") {
                    if !event_type.is_empty() {
                        overrides.push((
                            format!("routing.buckets.{}", event_type.to_lowercase()),
                            value,
                        ));
                    }
                }
            }
        }
    }

    overrides.sort();
    overrides
}

impl RoutingConfig {
    /// Check that exactly one primary routing mode is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_primary = self
            .primary_bucket
            .as_deref()
            .is_some_and(|b| !b.trim().is_empty());

        if let Some((event_type, _)) = self.buckets.iter().find(|(_, b)| b.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: format!("routing.buckets.{}", event_type),
                message: "bucket name is empty".to_string(),
            });
        }

        match (has_primary, self.buckets.is_empty()) {
            (false, true) => Err(ConfigError::MissingRequired(
                "PRIMARY_BUCKET or BUCKET_<EVENT_TYPE>".to_string(),
            )),
            (true, false) => Err(ConfigError::InvalidValue {
                key: "routing".to_string(),
                message: "set either PRIMARY_BUCKET or BUCKET_<EVENT_TYPE>, not both".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Quarantine bucket, if one is usable
    pub fn quarantine(&self) -> Option<&str> {
        self.quarantine_bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
    }
}

impl KafkaConfig {
    /// Redelivery delay as Duration
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary_bucket: None,
            buckets: HashMap::new(),
            quarantine_bucket: None,
            partition_by_event_type: default_true(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            consumer_group: default_consumer_group(),
            topic: default_topic(),
            ssl_enabled: false,
            ssl_ca_location: None,
            sasl_username: None,
            sasl_password: None,
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout_ms(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}
