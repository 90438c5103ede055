use anyhow::{Context, Result};
use clickstream_generator::{run_simulation, Config, EventGenerator, KafkaEventPublisher};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.log_level);

    info!(topic = %config.kafka.topic, "Starting clickstream generator");

    let publisher =
        KafkaEventPublisher::new(&config.kafka).context("Failed to initialize Kafka producer")?;

    let rng = match config.simulation.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut generator = EventGenerator::new(rng, config.simulation.poison_pill_rate)
        .context("Failed to initialize event generator")?;

    tokio::select! {
        result = run_simulation(&publisher, &mut generator, &config.simulation) => {
            match result {
                Ok(stats) => info!(
                    users = stats.users,
                    events = stats.events,
                    poison_pills = stats.poison_pills,
                    "Simulation finished"
                ),
                Err(e) => {
                    error!(error = %e, "Publishing failed; is the topic reachable?");
                    return Err(e.into());
                }
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C signal, generator stopped");
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}
