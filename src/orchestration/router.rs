//! # Router
//!
//! Stateless first-match routing over the processor registry.

use std::sync::Arc;
use tracing::debug;

use super::processor::Processor;
use crate::models::Notification;
use crate::registry::ProcessorRegistry;

/// Result of routing one envelope
///
/// `NoMatch` is not an error: it records that the notification arrived but no
/// processor is configured for it, which is distinct from a processor failing.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    Matched(Arc<dyn Processor>),
    NoMatch,
}

impl RouteDecision {
    pub fn processor_id(&self) -> Option<&str> {
        match self {
            Self::Matched(processor) => Some(processor.id()),
            Self::NoMatch => None,
        }
    }
}

/// Evaluates processor predicates in registration order
///
/// # Examples
///
/// ```rust
/// use ldn_core::models::Notification;
/// use ldn_core::orchestration::{MatchRule, RouteDecision, Router, RuleProcessor};
/// use ldn_core::processors::AcknowledgeProcessor;
/// use ldn_core::registry::ProcessorRegistry;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let review = Arc::new(RuleProcessor::new(
///     "reviews",
///     MatchRule::for_types(["Offer"]),
///     Arc::new(AcknowledgeProcessor::new("ack")),
/// ));
/// let registry = ProcessorRegistry::new().with(review).unwrap();
/// let router = Router::new(Arc::new(registry));
///
/// let offer = Notification::parse(json!({ "id": "m1", "type": "Offer:ReviewOffer" })).unwrap();
/// assert_eq!(router.route(&offer).processor_id(), Some("reviews"));
///
/// let other = Notification::parse(json!({ "id": "m2", "type": "Unknown" })).unwrap();
/// assert!(matches!(router.route(&other), RouteDecision::NoMatch));
/// ```
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ProcessorRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self { registry }
    }

    pub fn route(&self, notification: &Notification) -> RouteDecision {
        let decision = self
            .registry
            .all()
            .iter()
            .find(|processor| processor.matches(notification))
            .cloned()
            .map_or(RouteDecision::NoMatch, RouteDecision::Matched);

        debug!(
            message_id = %notification.id,
            processor_id = decision.processor_id(),
            "Routed notification"
        );
        decision
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::matching::{MatchRule, RuleProcessor};
    use crate::processors::AcknowledgeProcessor;
    use serde_json::json;

    fn rule_processor(id: &str, rule: MatchRule) -> Arc<dyn Processor> {
        Arc::new(RuleProcessor::new(
            id,
            rule,
            Arc::new(AcknowledgeProcessor::new(id)),
        ))
    }

    fn router(processors: Vec<Arc<dyn Processor>>) -> Router {
        let mut registry = ProcessorRegistry::new();
        for processor in processors {
            registry.register(processor).unwrap();
        }
        Router::new(Arc::new(registry))
    }

    fn review_announce() -> Notification {
        Notification::parse(json!({
            "id": "m1",
            "type": "Announce",
            "object": { "id": "https://example.org/r/1", "type": "sorg:Review" }
        }))
        .unwrap()
    }

    #[test]
    fn test_first_match_wins_and_order_matters() {
        let any_announce = || rule_processor("any-announce", MatchRule::for_types(["Announce"]));
        let reviews = || {
            rule_processor(
                "reviews",
                MatchRule::for_types(["Announce"]).with_object_types(["sorg:Review"]),
            )
        };

        let broad_first = router(vec![any_announce(), reviews()]);
        assert_eq!(
            broad_first.route(&review_announce()).processor_id(),
            Some("any-announce")
        );

        let specific_first = router(vec![reviews(), any_announce()]);
        assert_eq!(
            specific_first.route(&review_announce()).processor_id(),
            Some("reviews")
        );
    }

    #[test]
    fn test_routing_is_deterministic() {
        let router = router(vec![
            rule_processor("offers", MatchRule::for_types(["Offer"])),
            rule_processor("announces", MatchRule::for_types(["Announce"])),
        ]);
        let notification = review_announce();
        let first = router.route(&notification).processor_id().map(str::to_string);
        for _ in 0..10 {
            assert_eq!(
                router.route(&notification).processor_id().map(str::to_string),
                first
            );
        }
    }

    #[test]
    fn test_no_match() {
        let router = router(vec![rule_processor("offers", MatchRule::for_types(["Offer"]))]);
        assert!(matches!(
            router.route(&review_announce()),
            RouteDecision::NoMatch
        ));
        assert!(matches!(
            Router::new(Arc::new(ProcessorRegistry::new())).route(&review_announce()),
            RouteDecision::NoMatch
        ));
    }
}
