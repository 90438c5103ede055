use crate::config::ApiConfig;
use crate::router::{IngestionRouter, RouteError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<IngestionRouter>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Create the HTTP push endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(push))
        .route("/push", post(push))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ingestion-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.router.check_destinations().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "storage": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "storage": "unreachable",
                "error": e.to_string()
            })),
        ),
    }
}

/// Push delivery endpoint.
///
/// Any 2xx acknowledges the message. Data problems are acknowledged too,
/// since they were quarantined; only storage failures get a 500 so the
/// transport redelivers.
#[instrument(skip(state, body), fields(size_bytes = body.len()))]
async fn push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    match state.router.route_envelope(&body, "http").await {
        Ok(delivered) => {
            debug!(outcome = ?delivered, "Push message acknowledged");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            let code = match &e {
                RouteError::PrimaryWrite(_) => "PRIMARY_WRITE_FAILED",
                RouteError::QuarantineWrite { .. } => "QUARANTINE_WRITE_FAILED",
            };
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: code.to_string(),
                }),
            ))
        }
    }
}

/// Start the API server and serve until `shutdown` is cancelled
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting push endpoint");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    info!("Push endpoint stopped");

    Ok(())
}
