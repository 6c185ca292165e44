//! # Forward Processor
//!
//! Relays a notification to the inbox named in its `target`, as a new
//! activity whose `inReplyTo` is the inbound id.
//!
//! The outbound id is a name-based (v5) UUID of the inbound id, so every
//! re-invocation for the same notification, from any process, sends the same
//! activity and the receiving inbox can collapse the repeats.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::outbound::{OutboundError, OutboundSender};
use crate::constants::{ACTIVITY_STREAMS_CONTEXT, COAR_NOTIFY_CONTEXT};
use crate::models::Notification;
use crate::orchestration::processor::{Processor, ProcessorError, ProcessorOutcome, ProcessorResult};

fn default_types() -> Vec<String> {
    vec!["Announce".to_string()]
}

/// Settings for a `forward` route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardSettings {
    /// Our own service id, sent as `actor` and `origin`
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Activity types of the outbound notification
    #[serde(default = "default_types")]
    pub types: Vec<String>,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            actor_id: None,
            types: default_types(),
        }
    }
}

impl ForwardSettings {
    pub fn from_value(settings: Value) -> Result<Self, ProcessorError> {
        let settings: Self = serde_json::from_value(settings)
            .map_err(|e| ProcessorError::Settings(e.to_string()))?;
        if settings.types.is_empty() {
            return Err(ProcessorError::Settings(
                "types must name at least one activity type".to_string(),
            ));
        }
        Ok(settings)
    }
}

pub struct ForwardProcessor {
    id: String,
    settings: ForwardSettings,
    sender: Arc<dyn OutboundSender>,
}

impl ForwardProcessor {
    pub fn new(
        id: impl Into<String>,
        settings: ForwardSettings,
        sender: Arc<dyn OutboundSender>,
    ) -> Self {
        Self {
            id: id.into(),
            settings,
            sender,
        }
    }

    /// Stable outbound id for the relay of `message_id`
    pub fn outbound_id(message_id: &str) -> String {
        format!(
            "urn:uuid:{}",
            Uuid::new_v5(&Uuid::NAMESPACE_URL, message_id.as_bytes())
        )
    }

    /// Outbound activity relaying `notification`
    pub fn build_outbound(&self, notification: &Notification) -> Value {
        let mut document = Map::new();
        document.insert(
            "@context".to_string(),
            json!([ACTIVITY_STREAMS_CONTEXT, COAR_NOTIFY_CONTEXT]),
        );
        document.insert(
            "id".to_string(),
            Value::String(Self::outbound_id(&notification.id)),
        );
        document.insert("type".to_string(), json!(self.settings.types));

        if let Some(actor_id) = &self.settings.actor_id {
            let service = json!({ "id": actor_id, "type": "Service" });
            document.insert("actor".to_string(), service.clone());
            document.insert("origin".to_string(), service);
        }

        for field in ["object", "context", "target"] {
            if let Some(value) = notification.raw.get(field) {
                document.insert(field.to_string(), value.clone());
            }
        }
        document.insert(
            "inReplyTo".to_string(),
            Value::String(notification.id.clone()),
        );

        Value::Object(document)
    }
}

#[async_trait]
impl Processor for ForwardProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, _notification: &Notification) -> bool {
        true
    }

    async fn process(&self, notification: &Notification) -> ProcessorResult {
        let Some(inbox) = notification.target_inbox() else {
            return Ok(ProcessorOutcome::permanent("notification has no target inbox"));
        };

        let outbound = self.build_outbound(notification);
        match self.sender.send(inbox, &outbound).await {
            Ok(()) => {
                let outbound_id = outbound.get("id").and_then(serde_json::Value::as_str);
                info!(
                    processor_id = %self.id,
                    message_id = %notification.id,
                    inbox = inbox,
                    outbound_id = outbound_id,
                    "📤 Notification forwarded"
                );
                Ok(ProcessorOutcome::Success)
            }
            Err(error @ OutboundError::Transient { .. }) => {
                Ok(ProcessorOutcome::transient(error.to_string()))
            }
            Err(error) => Ok(ProcessorOutcome::permanent(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, Value)>>,
        fail_with: Mutex<Option<OutboundError>>,
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send(&self, inbox_url: &str, document: &Value) -> Result<(), OutboundError> {
            if let Some(error) = self.fail_with.lock().take() {
                return Err(error);
            }
            self.sent
                .lock()
                .push((inbox_url.to_string(), document.clone()));
            Ok(())
        }
    }

    fn relationship() -> Notification {
        Notification::parse(json!({
            "id": "urn:uuid:rel-1",
            "type": ["Announce", "coar-notify:RelationshipAction"],
            "object": { "id": "https://repo.org/item/1" },
            "target": {
                "id": "https://aggregator.org/",
                "type": "Service",
                "inbox": "https://aggregator.org/inbox"
            }
        }))
        .unwrap()
    }

    fn settings() -> ForwardSettings {
        ForwardSettings {
            actor_id: Some("https://repo.org/".to_string()),
            ..ForwardSettings::default()
        }
    }

    #[tokio::test]
    async fn test_forwards_to_target_inbox() {
        let sender = Arc::new(RecordingSender::default());
        let processor = ForwardProcessor::new("relay", settings(), sender.clone());

        assert!(processor.process(&relationship()).await.unwrap().is_success());

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        let (inbox, document) = &sent[0];
        assert_eq!(inbox, "https://aggregator.org/inbox");
        assert_eq!(document["inReplyTo"], "urn:uuid:rel-1");
        assert_eq!(document["actor"]["id"], "https://repo.org/");
        assert_eq!(document["object"]["id"], "https://repo.org/item/1");
    }

    #[tokio::test]
    async fn test_redelivery_after_restart_reuses_outbound_id() {
        let sender = Arc::new(RecordingSender::default());
        let before_restart = ForwardProcessor::new("relay", settings(), sender.clone());
        let after_restart = ForwardProcessor::new("relay", settings(), sender.clone());

        before_restart.process(&relationship()).await.unwrap();
        after_restart.process(&relationship()).await.unwrap();

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1["id"], sent[1].1["id"]);
        assert_eq!(sent[0].1["id"], ForwardProcessor::outbound_id("urn:uuid:rel-1"));
        assert_ne!(
            ForwardProcessor::outbound_id("urn:uuid:rel-1"),
            ForwardProcessor::outbound_id("urn:uuid:rel-2")
        );
    }

    #[tokio::test]
    async fn test_missing_inbox_is_permanent() {
        let sender = Arc::new(RecordingSender::default());
        let processor = ForwardProcessor::new("relay", settings(), sender);
        let notification =
            Notification::parse(json!({ "id": "m1", "type": "Announce" })).unwrap();

        let outcome = processor.process(&notification).await.unwrap();
        assert!(matches!(outcome, ProcessorOutcome::PermanentFailure(_)));
    }

    #[tokio::test]
    async fn test_delivery_errors_are_classified() {
        let sender = Arc::new(RecordingSender::default());
        let processor = ForwardProcessor::new("relay", settings(), sender.clone());

        *sender.fail_with.lock() = Some(OutboundError::Transient {
            inbox: "https://aggregator.org/inbox".to_string(),
            reason: "connection refused".to_string(),
        });
        let outcome = processor.process(&relationship()).await.unwrap();
        assert!(matches!(outcome, ProcessorOutcome::TransientFailure(_)));

        *sender.fail_with.lock() = Some(OutboundError::Rejected {
            inbox: "https://aggregator.org/inbox".to_string(),
            status: 400,
            body: "bad request".to_string(),
        });
        let outcome = processor.process(&relationship()).await.unwrap();
        assert!(matches!(outcome, ProcessorOutcome::PermanentFailure(_)));
    }
}
