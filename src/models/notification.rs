//! # Notification Envelope
//!
//! Canonical, immutable form of one Linked Data Notification.
//!
//! Inbound documents are JSON-LD activities in the COAR Notify shape:
//!
//! ```json
//! {
//!   "@context": ["https://www.w3.org/ns/activitystreams", "https://purl.org/coar/notify"],
//!   "id": "urn:uuid:0370c0fb-bb78-4a9b-87f5-bed307a509dd",
//!   "type": ["Announce", "coar-notify:ReviewAction"],
//!   "actor": { "id": "https://review-service.org/", "type": "Service" },
//!   "object": { "id": "https://review-service.org/review/1", "type": ["Page", "sorg:Review"] },
//!   "target": { "id": "https://repo.org/", "type": "Service", "inbox": "https://repo.org/ldn/inbox" }
//! }
//! ```
//!
//! Only the routing-relevant subset is modelled; the full document is retained
//! verbatim in [`Notification::raw`] for processors that need anything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::serde::deserialize_one_or_many;

/// Structural problems that prevent a document from becoming a [`Notification`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Notification must be a JSON object")]
    NotAnObject,

    #[error("Notification is missing an id")]
    MissingId,

    #[error("Notification is missing a type")]
    MissingType,

    #[error("Invalid notification field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// How to treat documents that arrive without an `id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// Missing ids make the document malformed
    #[default]
    Require,
    /// Missing ids are replaced with a fresh `urn:uuid:` identifier
    GenerateIfMissing,
}

/// Identifier plus optional type tags and inbox: actor, object, target, origin, context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationObject {
    pub id: String,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub object_type: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<String>,

    #[serde(rename = "ietf:cite-as", default, skip_serializing_if = "Option::is_none")]
    pub cite_as: Option<String>,
}

impl NotificationObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: Vec::new(),
            inbox: None,
            cite_as: None,
        }
    }

    pub fn with_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type.push(object_type.into());
        self
    }

    pub fn with_inbox(mut self, inbox: impl Into<String>) -> Self {
        self.inbox = Some(inbox.into());
        self
    }

    pub fn has_type(&self, object_type: &str) -> bool {
        self.object_type.iter().any(|t| t == object_type)
    }
}

/// Wire shape used only while validating an inbound document
#[derive(Debug, Deserialize)]
struct NotificationDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "deserialize_one_or_many")]
    notification_type: Vec<String>,
    #[serde(default)]
    actor: Option<NotificationObject>,
    #[serde(default)]
    object: Option<NotificationObject>,
    #[serde(default)]
    target: Option<NotificationObject>,
    #[serde(default)]
    origin: Option<NotificationObject>,
    #[serde(default)]
    context: Option<NotificationObject>,
    #[serde(rename = "inReplyTo", default)]
    in_reply_to: Option<String>,
}

/// One accepted notification; immutable once constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Idempotency key for the whole pipeline
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: Vec<String>,
    pub actor: Option<NotificationObject>,
    pub object: Option<NotificationObject>,
    pub target: Option<NotificationObject>,
    pub origin: Option<NotificationObject>,
    pub context: Option<NotificationObject>,
    pub in_reply_to: Option<String>,
    /// Document exactly as submitted
    pub raw: Value,
}

impl Notification {
    /// Validate a submitted JSON-LD document and build the envelope
    pub fn from_document(raw: Value, id_policy: IdPolicy) -> Result<Self, ValidationError> {
        if !raw.is_object() {
            return Err(ValidationError::NotAnObject);
        }

        let document: NotificationDocument = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::invalid_field("document", e.to_string()))?;

        let id = match document.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => match id_policy {
                IdPolicy::Require => return Err(ValidationError::MissingId),
                IdPolicy::GenerateIfMissing => format!("urn:uuid:{}", Uuid::new_v4()),
            },
        };

        let notification_type: Vec<String> = document
            .notification_type
            .into_iter()
            .filter(|tag| !tag.trim().is_empty())
            .collect();
        if notification_type.is_empty() {
            return Err(ValidationError::MissingType);
        }

        for (field, object) in [
            ("actor", &document.actor),
            ("object", &document.object),
            ("target", &document.target),
            ("origin", &document.origin),
            ("context", &document.context),
        ] {
            if let Some(object) = object {
                if object.id.trim().is_empty() {
                    return Err(ValidationError::invalid_field(field, "id must not be empty"));
                }
            }
        }

        Ok(Self {
            id,
            notification_type,
            actor: document.actor,
            object: document.object,
            target: document.target,
            origin: document.origin,
            context: document.context,
            in_reply_to: document.in_reply_to,
            raw,
        })
    }

    /// Parse a document with the default (strict) id policy
    pub fn parse(raw: Value) -> Result<Self, ValidationError> {
        Self::from_document(raw, IdPolicy::Require)
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.notification_type.iter().any(|t| t == tag)
    }

    pub fn object_types(&self) -> &[String] {
        self.object
            .as_ref()
            .map(|o| o.object_type.as_slice())
            .unwrap_or_default()
    }

    pub fn target_types(&self) -> &[String] {
        self.target
            .as_ref()
            .map(|t| t.object_type.as_slice())
            .unwrap_or_default()
    }

    pub fn target_inbox(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.inbox.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review_announce() -> Value {
        json!({
            "@context": ["https://www.w3.org/ns/activitystreams", "https://purl.org/coar/notify"],
            "id": "urn:uuid:0370c0fb-bb78-4a9b-87f5-bed307a509dd",
            "type": ["Announce", "coar-notify:ReviewAction"],
            "actor": { "id": "https://review-service.org/", "type": "Service" },
            "object": {
                "id": "https://review-service.org/review/1",
                "type": ["Page", "sorg:Review"],
                "ietf:cite-as": "https://doi.org/10.5555/12345680"
            },
            "target": {
                "id": "https://repo.org/",
                "type": "Service",
                "inbox": "https://repo.org/ldn/inbox"
            },
            "context": { "id": "https://repo.org/handle/123456789/1" },
            "inReplyTo": "urn:uuid:4fb3af44-d4f8-4226-9475-2d09c2d8d9e0"
        })
    }

    #[test]
    fn test_parses_coar_notify_announce() {
        let notification = Notification::parse(review_announce()).unwrap();

        assert_eq!(notification.id, "urn:uuid:0370c0fb-bb78-4a9b-87f5-bed307a509dd");
        assert!(notification.has_type("Announce"));
        assert!(notification.has_type("coar-notify:ReviewAction"));
        assert_eq!(notification.object_types(), ["Page", "sorg:Review"]);
        assert_eq!(notification.target_types(), ["Service"]);
        assert_eq!(notification.target_inbox(), Some("https://repo.org/ldn/inbox"));
        assert_eq!(
            notification.object.as_ref().unwrap().cite_as.as_deref(),
            Some("https://doi.org/10.5555/12345680")
        );
        assert_eq!(
            notification.in_reply_to.as_deref(),
            Some("urn:uuid:4fb3af44-d4f8-4226-9475-2d09c2d8d9e0")
        );
        assert_eq!(notification.raw, review_announce());
    }

    #[test]
    fn test_missing_id_is_rejected_by_default() {
        let mut document = review_announce();
        document.as_object_mut().unwrap().remove("id");

        assert_eq!(
            Notification::parse(document).unwrap_err(),
            ValidationError::MissingId
        );
    }

    #[test]
    fn test_missing_id_generated_when_allowed() {
        let mut document = review_announce();
        document.as_object_mut().unwrap().remove("id");

        let notification =
            Notification::from_document(document.clone(), IdPolicy::GenerateIfMissing).unwrap();
        assert!(notification.id.starts_with("urn:uuid:"));
        assert_eq!(notification.raw, document);
    }

    #[test]
    fn test_missing_or_blank_type_is_rejected() {
        assert_eq!(
            Notification::parse(json!({ "id": "m1" })).unwrap_err(),
            ValidationError::MissingType
        );
        assert_eq!(
            Notification::parse(json!({ "id": "m1", "type": ["", " "] })).unwrap_err(),
            ValidationError::MissingType
        );
    }

    #[test]
    fn test_non_object_documents_are_rejected() {
        assert_eq!(
            Notification::parse(json!(["Announce"])).unwrap_err(),
            ValidationError::NotAnObject
        );
    }

    #[test]
    fn test_sub_document_without_id_is_rejected() {
        let document = json!({ "id": "m1", "type": "Offer", "object": { "type": "Page" } });
        assert!(matches!(
            Notification::parse(document).unwrap_err(),
            ValidationError::InvalidField { .. }
        ));
    }
}
