use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::notification::Notification;
use crate::state_machine::QueueStatus;

/// Durable record of one accepted notification and its processing lifecycle
///
/// Owned by the message store; only the delivery coordinator (and the manual
/// retry override) produce new versions of it. Records are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Always equal to `envelope.id`
    pub id: String,
    pub envelope: Arc<Notification>,
    pub queue_status: QueueStatus,
    /// Processing attempts made so far; never decreases
    pub attempts: u32,
    /// Processor that last handled (or attempted) the message
    pub processor_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the retry scheduler may pick the record up again
    pub next_retry_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Create an untried record for a freshly accepted notification
    pub fn new(envelope: Arc<Notification>, now: DateTime<Utc>) -> Self {
        Self {
            id: envelope.id.clone(),
            envelope,
            queue_status: QueueStatus::Untried,
            attempts: 0,
            processor_id: None,
            last_error: None,
            created_at: now,
            last_attempt_at: None,
            next_retry_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.queue_status.is_terminal()
    }

    /// Failed because no processor was ever found for it
    pub fn is_unrouted(&self) -> bool {
        self.queue_status == QueueStatus::Failed && self.processor_id.is_none()
    }

    /// Instant the record becomes eligible for the retry scheduler
    pub fn due_at(&self) -> DateTime<Utc> {
        self.next_retry_at
            .or(self.last_attempt_at)
            .unwrap_or(self.created_at)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at() <= now
    }
}
