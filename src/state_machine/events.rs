use serde::{Deserialize, Serialize};

/// Events that can trigger message record state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Processor reported success
    Succeed,
    /// Processor reported a non-retriable failure
    FailPermanently(String),
    /// No registered processor accepted the notification
    Unroutable,
    /// Processor reported a retriable failure (including timeouts and faults)
    RequeueTransient(String),
    /// Retriable failure on the last permitted attempt
    Exhaust(String),
    /// Operator override: queue the message again
    ForceRetry,
}

impl MessageEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Succeed => "succeed",
            Self::FailPermanently(_) => "fail_permanently",
            Self::Unroutable => "unroutable",
            Self::RequeueTransient(_) => "requeue_transient",
            Self::Exhaust(_) => "exhaust",
            Self::ForceRetry => "force_retry",
        }
    }

    /// Failure reason carried by the event, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::FailPermanently(reason)
            | Self::RequeueTransient(reason)
            | Self::Exhaust(reason) => Some(reason),
            Self::Unroutable => Some(crate::constants::NO_PROCESSOR_MATCHED),
            Self::Succeed | Self::ForceRetry => None,
        }
    }
}
