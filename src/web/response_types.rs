//! # Web API Response Types
//!
//! Error type with HTTP status mappings, and the JSON shapes returned by the
//! inbox and message endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::error::LdnError;
use crate::models::MessageRecord;
use crate::orchestration::DeliveryOutcome;
use crate::state_machine::QueueStatus;

/// Web API errors with HTTP status code mappings
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found")]
    NotFound,

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Service temporarily unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error_code, message) = match &self {
            ApiError::NotFound => ("NOT_FOUND", "Resource not found"),
            ApiError::BadRequest { message } => ("BAD_REQUEST", message.as_str()),
            ApiError::Conflict { message } => ("CONFLICT", message.as_str()),
            ApiError::ServiceUnavailable { message } => ("SERVICE_UNAVAILABLE", message.as_str()),
            ApiError::Internal => ("INTERNAL_ERROR", "Internal server error"),
        };

        let error_response = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (self.status_code(), Json(error_response)).into_response()
    }
}

/// Malformed input is the client's fault; everything else is ours
impl From<LdnError> for ApiError {
    fn from(err: LdnError) -> Self {
        match err {
            LdnError::Validation(e) => ApiError::bad_request(e.to_string()),
            LdnError::Store(e) => ApiError::service_unavailable(e.to_string()),
            LdnError::StateTransition(e) => ApiError::conflict(e.to_string()),
            LdnError::Configuration(_) | LdnError::Registry(_) | LdnError::Orchestration(_) => {
                ApiError::Internal
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {err}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operator view of a message record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub types: Vec<String>,
    pub queue_status: QueueStatus,
    pub attempts: u32,
    pub processor_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&MessageRecord> for MessageSummary {
    fn from(record: &MessageRecord) -> Self {
        Self {
            id: record.id.clone(),
            types: record.envelope.notification_type.clone(),
            queue_status: record.queue_status,
            attempts: record.attempts,
            processor_id: record.processor_id.clone(),
            last_error: record.last_error.clone(),
            created_at: record.created_at,
            last_attempt_at: record.last_attempt_at,
            next_retry_at: record.next_retry_at,
            updated_at: record.updated_at,
        }
    }
}

/// Body returned by `POST /ldn/inbox`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxResponse {
    pub outcome: String,
    pub message: MessageSummary,
}

impl InboxResponse {
    /// HTTP status reported to the sender for this outcome
    pub fn status_for(outcome: &DeliveryOutcome) -> StatusCode {
        match outcome {
            DeliveryOutcome::Processed(_)
            | DeliveryOutcome::Failed(_)
            | DeliveryOutcome::Exhausted(_) => StatusCode::OK,
            DeliveryOutcome::Queued(_) => StatusCode::ACCEPTED,
            DeliveryOutcome::Unrouted(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<&DeliveryOutcome> for InboxResponse {
    fn from(outcome: &DeliveryOutcome) -> Self {
        Self {
            outcome: outcome.label().to_string(),
            message: MessageSummary::from(outcome.record()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(LdnError::Store(StoreError::NotFound {
                id: "m1".to_string()
            }))
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(LdnError::Orchestration("x".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
