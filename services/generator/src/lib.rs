//! Clickstream Generator
//!
//! Produces synthetic e-commerce shopper journeys (ad clicks, page views,
//! cart adds, purchases) and publishes them to Kafka for the ingestion
//! service. About one event in a hundred is a poison pill with no
//! timestamp, to keep the quarantine path exercised.
//!
//! # Example
//!
//! ```rust,no_run
//! use clickstream_generator::{Config, EventGenerator, KafkaEventPublisher, run_simulation};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let publisher = KafkaEventPublisher::new(&config.kafka)?;
//!     let mut generator = EventGenerator::new(
//!         StdRng::seed_from_u64(7),
//!         config.simulation.poison_pill_rate,
//!     )?;
//!
//!     run_simulation(&publisher, &mut generator, &config.simulation).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod journey;
pub mod publisher;

pub use catalog::{Product, PRODUCTS};
pub use config::{Config, ConfigError, KafkaConfig, SimulationConfig};
pub use journey::{ClickEvent, EventGenerator, EventType, JourneyType, ProductDetails};
pub use publisher::{envelope_for, EventSink, KafkaEventPublisher, PublishError};

use chrono::Local;
use rand::Rng;
use tracing::{info, instrument};

/// Totals for a finished simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub users: u64,
    pub events: u64,
    pub poison_pills: u64,
}

/// Publish journeys until `max_users` is reached.
///
/// Runs forever when `max_users` is unset; callers stop it by dropping the
/// future. A publish failure ends the run.
#[instrument(skip_all)]
pub async fn run_simulation<S, R>(
    sink: &S,
    generator: &mut EventGenerator<R>,
    settings: &SimulationConfig,
) -> Result<SimulationStats, PublishError>
where
    S: EventSink + ?Sized,
    R: Rng + Send,
{
    let mut stats = SimulationStats::default();

    while settings.max_users.map_or(true, |max| stats.users < max) {
        let journey = generator.simulate_user_journey(Local::now().naive_local());

        for event in &journey {
            sink.publish(event).await?;

            stats.events += 1;
            if event.is_poison_pill() {
                stats.poison_pills += 1;
            }

            let pause = generator.random_millis(
                settings.publish_delay_min_ms,
                settings.publish_delay_max_ms,
            );
            tokio::time::sleep(pause).await;
        }

        stats.users += 1;
        info!(
            users = stats.users,
            events = journey.len(),
            "New user history published"
        );

        let gap = generator.random_millis(settings.user_gap_min_ms, settings.user_gap_max_ms);
        tokio::time::sleep(gap).await;
    }

    Ok(stats)
}
