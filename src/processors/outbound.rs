//! # Outbound Delivery
//!
//! Sends notifications produced by processors to a remote LDN inbox.
//! Delivery failures are classified so the calling processor can report a
//! transient or a permanent outcome.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OutboundConfig;
use crate::constants::LDN_CONTENT_TYPE;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum OutboundError {
    /// Worth retrying: connection failure, timeout, 5xx or 429
    #[error("Transient delivery failure to {inbox}: {reason}")]
    Transient { inbox: String, reason: String },

    /// The remote inbox refused the notification
    #[error("Delivery to {inbox} rejected with HTTP {status}: {body}")]
    Rejected {
        inbox: String,
        status: u16,
        body: String,
    },

    #[error("Invalid outbound request: {0}")]
    InvalidRequest(String),
}

impl OutboundError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Delivery mechanism for outbound notifications
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, inbox_url: &str, document: &Value) -> Result<(), OutboundError>;
}

/// `OutboundSender` that POSTs `application/ld+json` over HTTP
#[derive(Debug, Clone)]
pub struct HttpOutboundSender {
    client: Client,
}

impl HttpOutboundSender {
    pub fn new(config: &OutboundConfig) -> Result<Self, OutboundError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                OutboundError::InvalidRequest(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    fn classify_status(inbox: &str, status: StatusCode, body: String) -> OutboundError {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            OutboundError::Transient {
                inbox: inbox.to_string(),
                reason: format!("HTTP {status}"),
            }
        } else {
            OutboundError::Rejected {
                inbox: inbox.to_string(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            }
        }
    }
}

#[async_trait]
impl OutboundSender for HttpOutboundSender {
    async fn send(&self, inbox_url: &str, document: &Value) -> Result<(), OutboundError> {
        let url = Url::parse(inbox_url)
            .map_err(|e| {
                OutboundError::InvalidRequest(format!("Invalid inbox URL '{inbox_url}': {e}"))
            })?;
        let body = serde_json::to_vec(document)
            .map_err(|e| OutboundError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, LDN_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| OutboundError::Transient {
                inbox: inbox_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(inbox = inbox_url, status = %status, "Outbound notification delivered");
            return Ok(());
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error = Self::classify_status(inbox_url, status, text);
        warn!(inbox = inbox_url, status = %status, error = %error, "Outbound delivery failed");
        Err(error)
    }
}
