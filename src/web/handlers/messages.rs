//! # Message Handlers
//!
//! Operator endpoints over stored message records. Ids are matched as one
//! path segment, so URI ids must be percent-encoded.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::orchestration::ForceRetryOutcome;
use crate::state_machine::QueueStatus;
use crate::web::response_types::{ApiError, ApiResult, MessageSummary};
use crate::web::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub status: String,
    pub limit: Option<usize>,
}

/// Record summary: GET /ldn/messages/:id
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageSummary>> {
    let record = state
        .coordinator
        .get(&id)
        .await
        .map_err(|e| ApiError::service_unavailable(e.to_string()))?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(MessageSummary::from(&record)))
}

/// Records in one status, oldest first: GET /ldn/messages?status=FAILED&limit=20
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<Vec<MessageSummary>>> {
    let status: QueueStatus = query.status.parse().map_err(ApiError::bad_request)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let records = state
        .coordinator
        .store()
        .list_by_status(status, limit)
        .await
        .map_err(|e| ApiError::service_unavailable(e.to_string()))?;

    Ok(Json(records.iter().map(MessageSummary::from).collect()))
}

/// Manual retry: POST /ldn/messages/:id/retry
///
/// Queues the message for immediate re-processing. Processed messages are
/// never re-run and answer 409.
pub async fn retry_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageSummary>> {
    match state.coordinator.force_retry(&id).await? {
        ForceRetryOutcome::Queued(record) => {
            info!(message_id = %id, "Message queued by operator request");
            Ok(Json(MessageSummary::from(&record)))
        }
        ForceRetryOutcome::AlreadyProcessed(_) => Err(ApiError::conflict(format!(
            "Message {id} is already processed"
        ))),
        ForceRetryOutcome::NotFound => Err(ApiError::NotFound),
    }
}
