use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading generator configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Generator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Kafka producer settings
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// Topic the ingestion service consumes
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Client ID reported to the brokers
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// How long to wait for a delivery report
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

/// Shape of the synthetic traffic
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Probability that an event loses its timestamp
    #[serde(default = "default_poison_pill_rate")]
    pub poison_pill_rate: f64,
    /// Pacing between published messages
    #[serde(default = "default_publish_delay_min_ms")]
    pub publish_delay_min_ms: u64,
    #[serde(default = "default_publish_delay_max_ms")]
    pub publish_delay_max_ms: u64,
    /// Pause before the next user arrives
    #[serde(default = "default_user_gap_min_ms")]
    pub user_gap_min_ms: u64,
    #[serde(default = "default_user_gap_max_ms")]
    pub user_gap_max_ms: u64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
    /// Stop after this many users; runs until interrupted when unset
    #[serde(default)]
    pub max_users: Option<u64>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_topic() -> String {
    "clickstream-events".to_string()
}

fn default_client_id() -> String {
    "clickstream-generator".to_string()
}

fn default_message_timeout_ms() -> u64 {
    5000
}

fn default_poison_pill_rate() -> f64 {
    0.01
}

fn default_publish_delay_min_ms() -> u64 {
    10
}

fn default_publish_delay_max_ms() -> u64 {
    100
}

fn default_user_gap_min_ms() -> u64 {
    1000
}

fn default_user_gap_max_ms() -> u64 {
    3000
}

impl Config {
    /// Load configuration from config files and `GENERATOR__*` variables
    pub fn load() -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::with_name("config/generator").required(false))
            // GENERATOR__KAFKA__TOPIC -> kafka.topic
            .add_source(
                config::Environment::with_prefix("GENERATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.simulation.validate()?;
        Ok(config)
    }
}

impl KafkaConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }
}

impl SimulationConfig {
    /// Check rates and ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.poison_pill_rate) {
            return Err(ConfigError::InvalidValue {
                key: "simulation.poison_pill_rate".to_string(),
                message: format!("{} is not a probability", self.poison_pill_rate),
            });
        }
        check_range(
            "simulation.publish_delay",
            self.publish_delay_min_ms,
            self.publish_delay_max_ms,
        )?;
        check_range(
            "simulation.user_gap",
            self.user_gap_min_ms,
            self.user_gap_max_ms,
        )
    }
}

fn check_range(key: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("min {} is greater than max {}", min, max),
        });
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            kafka: KafkaConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            topic: default_topic(),
            client_id: default_client_id(),
            message_timeout_ms: default_message_timeout_ms(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            poison_pill_rate: default_poison_pill_rate(),
            publish_delay_min_ms: default_publish_delay_min_ms(),
            publish_delay_max_ms: default_publish_delay_max_ms(),
            user_gap_min_ms: default_user_gap_min_ms(),
            user_gap_max_ms: default_user_gap_max_ms(),
            seed: None,
            max_users: None,
        }
    }
}
