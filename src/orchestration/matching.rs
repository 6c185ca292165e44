//! # Match Rules
//!
//! Declarative predicates over `(type, object.type, target.type)`.
//!
//! A [`TypePattern`] matches a single type tag:
//!
//! | pattern          | matches                                      |
//! |------------------|----------------------------------------------|
//! | `Announce`       | `Announce`                                   |
//! | `Offer`          | `Offer`, `Offer:ReviewOffer` (prefix segment) |
//! | `coar-notify:*`  | any tag starting with `coar-notify:`         |
//!
//! A [`MatchRule`] requires every `types` pattern to be matched by some
//! notification tag, and, when non-empty, at least one `object_types` and one
//! `target_types` pattern to match the corresponding sub-document types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::processor::{Processor, ProcessorResult};
use crate::models::Notification;

/// Pattern over one type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypePattern {
    /// The tag itself, or the tag followed by `:` and a refinement
    Exact(String),
    /// Any tag starting with the prefix
    Prefix(String),
}

impl TypePattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Exact(expected) => {
                tag == expected
                    || tag
                        .strip_prefix(expected.as_str())
                        .is_some_and(|rest| rest.starts_with(':'))
            }
            Self::Prefix(prefix) => tag.starts_with(prefix.as_str()),
        }
    }

    pub fn matches_any(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.matches(tag))
    }
}

impl From<String> for TypePattern {
    fn from(pattern: String) -> Self {
        Self::parse(&pattern)
    }
}

impl From<&str> for TypePattern {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

impl From<TypePattern> for String {
    fn from(pattern: TypePattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(tag) => write!(f, "{tag}"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Predicate a route applies to an envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    #[serde(default)]
    pub types: Vec<TypePattern>,
    #[serde(default)]
    pub object_types: Vec<TypePattern>,
    #[serde(default)]
    pub target_types: Vec<TypePattern>,
}

impl MatchRule {
    pub fn for_types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypePattern>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_object_types<I, T>(mut self, object_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypePattern>,
    {
        self.object_types = object_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_types<I, T>(mut self, target_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypePattern>,
    {
        self.target_types = target_types.into_iter().map(Into::into).collect();
        self
    }

    /// An empty rule matches nothing
    pub fn matches(&self, notification: &Notification) -> bool {
        if self.types.is_empty() {
            return false;
        }

        let tags = &notification.notification_type;
        if !self.types.iter().all(|pattern| pattern.matches_any(tags)) {
            return false;
        }

        Self::any_matches(&self.object_types, notification.object_types())
            && Self::any_matches(&self.target_types, notification.target_types())
    }

    fn any_matches(patterns: &[TypePattern], tags: &[String]) -> bool {
        patterns.is_empty() || patterns.iter().any(|pattern| pattern.matches_any(tags))
    }
}

/// Processor guarded by a configured [`MatchRule`]
///
/// Routes built from configuration wrap the processor for their kind in one of
/// these, so the route name becomes the processor id.
pub struct RuleProcessor {
    id: String,
    rule: MatchRule,
    inner: Arc<dyn Processor>,
}

impl RuleProcessor {
    pub fn new(id: impl Into<String>, rule: MatchRule, inner: Arc<dyn Processor>) -> Self {
        Self {
            id: id.into(),
            rule,
            inner,
        }
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }
}

#[async_trait]
impl Processor for RuleProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, notification: &Notification) -> bool {
        self.rule.matches(notification) && self.inner.matches(notification)
    }

    async fn process(&self, notification: &Notification) -> ProcessorResult {
        self.inner.process(notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(value: serde_json::Value) -> Notification {
        Notification::parse(value).unwrap()
    }

    #[test]
    fn test_exact_pattern_matches_prefix_segment() {
        let offer = TypePattern::parse("Offer");
        assert!(offer.matches("Offer"));
        assert!(offer.matches("Offer:ReviewOffer"));
        assert!(!offer.matches("OfferLetter"));
        assert!(!offer.matches("Announce"));
    }

    #[test]
    fn test_glob_pattern() {
        let pattern = TypePattern::parse("coar-notify:*");
        assert_eq!(pattern, TypePattern::Prefix("coar-notify:".to_string()));
        assert!(pattern.matches("coar-notify:ReviewAction"));
        assert!(!pattern.matches("Announce"));
        assert_eq!(pattern.to_string(), "coar-notify:*");
    }

    #[test]
    fn test_rule_requires_every_type() {
        let rule = MatchRule::for_types(["Announce", "coar-notify:ReviewAction"]);

        assert!(rule.matches(&notification(json!({
            "id": "m1", "type": ["Announce", "coar-notify:ReviewAction"]
        }))));
        assert!(!rule.matches(&notification(json!({ "id": "m2", "type": "Announce" }))));
    }

    #[test]
    fn test_rule_object_and_target_refinements() {
        let rule = MatchRule::for_types(["Announce"])
            .with_object_types(["sorg:Review", "sorg:WebPage"])
            .with_target_types(["Service"]);

        let review = notification(json!({
            "id": "m1",
            "type": "Announce",
            "object": { "id": "https://example.org/r/1", "type": ["Page", "sorg:Review"] },
            "target": { "id": "https://repo.org/", "type": "Service" }
        }));
        assert!(rule.matches(&review));

        let no_object = notification(json!({
            "id": "m2",
            "type": "Announce",
            "target": { "id": "https://repo.org/", "type": "Service" }
        }));
        assert!(!rule.matches(&no_object));
    }

    #[test]
    fn test_empty_rule_matches_nothing() {
        let rule = MatchRule::default();
        assert!(!rule.matches(&notification(json!({ "id": "m1", "type": "Announce" }))));
    }

    #[test]
    fn test_rule_deserializes_from_strings() {
        let rule: MatchRule = serde_json::from_value(json!({
            "types": ["Offer"],
            "object_types": ["coar-notify:*"]
        }))
        .unwrap();
        assert_eq!(rule.types, vec![TypePattern::Exact("Offer".to_string())]);
        assert_eq!(
            rule.object_types,
            vec![TypePattern::Prefix("coar-notify:".to_string())]
        );
        assert!(rule.target_types.is_empty());
    }
}
