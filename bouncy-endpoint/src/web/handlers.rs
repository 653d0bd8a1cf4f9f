//! HTTP handlers for the SNS endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::processor::Processor;
use crate::sns::TOPIC_ARN_HEADER;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub processor: Arc<Processor>,
}

impl AppState {
    pub fn new(config: Config, processor: Processor) -> Self {
        Self {
            config: Arc::new(config),
            processor: Arc::new(processor),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// SNS Endpoint
// =============================================================================

/// Receives every SNS delivery for the configured topics.
///
/// Registered for all methods so that anything but POST gets the same bare
/// 404 as an unknown route.
pub async fn sns_endpoint(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let topic_header = headers
        .get(TOPIC_ARN_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.processor.handle(&method, topic_header, &body).await {
        Ok(outcome) => (outcome.status, outcome.body),
        Err(e) => {
            error!(error = %e, "sns_notification_processing_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
        }
    }
}

/// Router with the SNS endpoint mounted at `config.endpoint_path`.
pub fn build_router(state: AppState) -> Router {
    let endpoint_path = state.config.endpoint_path.clone();

    Router::new()
        .route("/health", get(health))
        .route(&endpoint_path, any(sns_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
