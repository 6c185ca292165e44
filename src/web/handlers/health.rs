//! # Health Check Handler

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use crate::metrics::DeliveryMetricsSnapshot;
use crate::store::StatusCounts;
use crate::web::response_types::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub message_counts: StatusCounts,
    pub metrics: DeliveryMetricsSnapshot,
    pub processors: Vec<String>,
}

/// Health check endpoint: GET /health
///
/// Answers 503 when the message store cannot be queried.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let message_counts = state
        .coordinator
        .store()
        .count_by_status()
        .await
        .map_err(|e| {
            error!(error = %e, "Health check could not reach the message store");
            ApiError::service_unavailable("message store unavailable")
        })?;

    let now = Utc::now();
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: now.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        message_counts,
        metrics: state.coordinator.metrics().snapshot(),
        processors: state.coordinator.router().registry().stats().processor_ids,
    }))
}
