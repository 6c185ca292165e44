use async_trait::async_trait;
use tracing::info;

use crate::models::Notification;
use crate::orchestration::processor::{Processor, ProcessorOutcome, ProcessorResult};

/// Accepts every notification and succeeds without side effects
///
/// Useful for notification types that only need to be recorded, and as a
/// catch-all at the end of the routing table.
#[derive(Debug, Clone)]
pub struct AcknowledgeProcessor {
    id: String,
}

impl AcknowledgeProcessor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Processor for AcknowledgeProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, _notification: &Notification) -> bool {
        true
    }

    async fn process(&self, notification: &Notification) -> ProcessorResult {
        info!(
            processor_id = %self.id,
            message_id = %notification.id,
            types = ?notification.notification_type,
            actor = notification.actor.as_ref().map(|a| a.id.as_str()),
            "✅ Notification acknowledged"
        );
        Ok(ProcessorOutcome::Success)
    }
}
