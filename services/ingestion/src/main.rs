use anyhow::{Context, Result};
use ingestion_service::api::{start_api_server, AppState};
use ingestion_service::{Config, IngestionRouter, KafkaIngestionConsumer, S3ObjectStore};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Clickstream Ingestion Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // One storage client for the whole process
    let store = Arc::new(S3ObjectStore::new(&config.s3).await);

    let router = Arc::new(
        IngestionRouter::from_config(store, &config.routing)
            .context("Failed to initialize ingestion router")?,
    );

    let shutdown = CancellationToken::new();

    // Spawn Kafka consumer task
    let consumer_handle = match &config.kafka {
        Some(kafka_config) => {
            let consumer = KafkaIngestionConsumer::new(kafka_config, router.clone())
                .context("Failed to initialize Kafka consumer")?;
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = consumer.run(token).await {
                    error!(error = %e, "Kafka consumer error");
                }
            }))
        }
        None => {
            info!("No Kafka source configured; serving push endpoint only");
            None
        }
    };

    // Spawn API server task
    let api_state = AppState {
        router: router.clone(),
    };
    let api_config = config.api.clone();
    let token = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, token).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Ingestion service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down ingestion service");

    // Let in-flight messages finish; unfinished ones stay unacknowledged
    shutdown.cancel();

    if let Some(handle) = consumer_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Kafka consumer task panicked");
        }
    }
    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task panicked");
    }

    info!("Ingestion service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
