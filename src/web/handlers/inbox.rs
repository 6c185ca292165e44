//! # Inbox Handler
//!
//! `POST /ldn/inbox`: accept a JSON-LD notification and deliver it.
//!
//! The response reflects what happened on this call: 200 when a processor ran
//! to completion (success or permanent failure), 202 when the message was
//! queued for retry, 422 when no processor matched, 400 for malformed input
//! and 503 when the message store is unavailable.
//!
//! Delivery runs on its own task, so a client that disconnects (or a request
//! timeout) does not abandon an attempt half way through.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::web::response_types::{ApiError, ApiResult, InboxResponse};
use crate::web::state::AppState;

pub async fn receive_notification(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<InboxResponse>)> {
    let document: Value = serde_json::from_slice(&body)?;

    let coordinator = state.coordinator.clone();
    let delivery = tokio::spawn(async move { coordinator.submit(document).await });

    let outcome = delivery
        .await
        .map_err(|e| {
            error!(error = %e, "Delivery task failed");
            ApiError::Internal
        })?
        .map_err(|e| {
            if e.is_client_error() {
                debug!(error = %e, "Rejected malformed notification");
            } else {
                warn!(error = %e, "Failed to deliver notification");
            }
            ApiError::from(e)
        })?;

    Ok((
        InboxResponse::status_for(&outcome),
        Json(InboxResponse::from(&outcome)),
    ))
}
