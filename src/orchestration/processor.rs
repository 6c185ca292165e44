//! # Processor Contract
//!
//! A processor is the only place domain logic lives. The engine routes an
//! envelope to exactly one processor, invokes it, and records the outcome.
//!
//! Processors must be safe to invoke more than once with the same envelope:
//! a crash between the side effect and the status write means the engine will
//! deliver the message again. Implementations either make their side effect
//! idempotent or check the target state before acting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::Notification;

/// Result of one processing attempt as judged by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ProcessorOutcome {
    Success,
    /// Worth retrying later (downstream unavailable, rate limited, ...)
    TransientFailure(String),
    /// Retrying will not help (business rule violation, unknown item, ...)
    PermanentFailure(String),
}

impl ProcessorOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentFailure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ProcessorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::TransientFailure(reason) => write!(f, "transient failure: {reason}"),
            Self::PermanentFailure(reason) => write!(f, "permanent failure: {reason}"),
        }
    }
}

/// Unexpected fault raised by a processor
///
/// The coordinator treats every `ProcessorError` as a transient failure with
/// the error text as the reason.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor fault: {0}")]
    Fault(String),

    #[error("Invalid processor settings: {0}")]
    Settings(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ProcessorResult = Result<ProcessorOutcome, ProcessorError>;

/// Polymorphic unit of business logic behind the router
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable identifier recorded on the message record
    fn id(&self) -> &str;

    /// Whether this processor accepts the envelope
    fn matches(&self, notification: &Notification) -> bool;

    async fn process(&self, notification: &Notification) -> ProcessorResult;
}

impl fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor").field("id", &self.id()).finish()
    }
}
