//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ldn_core::models::Notification;
use ldn_core::orchestration::{
    BackoffCalculator, DeliveryCoordinator, FixedInterval, MatchRule, Processor, ProcessorError,
    ProcessorOutcome, ProcessorResult, Router,
};
use ldn_core::registry::ProcessorRegistry;
use ldn_core::store::InMemoryMessageStore;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted processor response
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Transient(String),
    Permanent(String),
    Error(String),
    Panic,
    Hang,
}

impl Step {
    pub fn transient(reason: &str) -> Self {
        Self::Transient(reason.to_string())
    }

    pub fn permanent(reason: &str) -> Self {
        Self::Permanent(reason.to_string())
    }
}

/// Processor that plays back a script of outcomes and records concurrency
pub struct ScriptedProcessor {
    id: String,
    rule: MatchRule,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Duration,
    invocations: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProcessor {
    pub fn new(id: &str, rule: MatchRule) -> Self {
        Self {
            id: id.to_string(),
            rule,
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Succeed,
            delay: Duration::ZERO,
            invocations: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        *self.script.lock() = steps.into_iter().collect();
        self
    }

    /// Response once the script is used up
    pub fn with_fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for ScriptedProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, notification: &Notification) -> bool {
        self.rule.matches(notification)
    }

    async fn process(&self, _notification: &Notification) -> ProcessorResult {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Succeed => Ok(ProcessorOutcome::Success),
            Step::Transient(reason) => Ok(ProcessorOutcome::TransientFailure(reason)),
            Step::Permanent(reason) => Ok(ProcessorOutcome::PermanentFailure(reason)),
            Step::Error(reason) => Err(ProcessorError::Fault(reason)),
            Step::Panic => panic!("scripted panic"),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProcessorOutcome::Success)
            }
        }
    }
}

/// Backoff that makes every retry due immediately
pub fn immediate_backoff(max_attempts: u32) -> BackoffCalculator {
    BackoffCalculator::new(Arc::new(FixedInterval {
        interval: Duration::ZERO,
        max_attempts,
    }))
}

pub fn coordinator_with(
    processors: Vec<Arc<dyn Processor>>,
    backoff: BackoffCalculator,
) -> DeliveryCoordinator {
    let mut registry = ProcessorRegistry::new();
    for processor in processors {
        registry.register(processor).unwrap();
    }
    DeliveryCoordinator::new(
        Arc::new(InMemoryMessageStore::new()),
        Router::new(Arc::new(registry)),
        backoff,
    )
}

/// COAR Notify "Offer" asking a service to review a preprint
pub fn review_offer(id: &str) -> Value {
    json!({
        "@context": ["https://www.w3.org/ns/activitystreams", "https://purl.org/coar/notify"],
        "id": id,
        "type": ["Offer", "coar-notify:ReviewAction"],
        "actor": { "id": "https://research-organisation.org", "type": "Organization" },
        "object": {
            "id": "https://research-organisation.org/repository/preprint/201203/421/",
            "type": ["Page", "sorg:AboutPage"],
            "ietf:cite-as": "https://doi.org/10.5555/12345680"
        },
        "origin": {
            "id": "https://research-organisation.org/repository",
            "inbox": "https://research-organisation.org/inbox/",
            "type": "Service"
        },
        "target": {
            "id": "https://review-service.com/system",
            "inbox": "https://review-service.com/inbox/",
            "type": "Service"
        }
    })
}

/// COAR Notify "Announce" of a review about a repository item
pub fn review_announce(id: &str) -> Value {
    json!({
        "@context": ["https://www.w3.org/ns/activitystreams", "https://purl.org/coar/notify"],
        "id": id,
        "type": ["Announce", "coar-notify:ReviewAction"],
        "actor": { "id": "https://review-service.com", "type": "Service" },
        "context": {
            "id": "https://research-organisation.org/repository/preprint/201203/421/",
            "type": "sorg:AboutPage"
        },
        "object": {
            "id": "https://review-service.com/review/geo/202103/0021",
            "type": ["Page", "sorg:WebPage"],
            "ietf:cite-as": "https://doi.org/10.3214/987654"
        },
        "origin": {
            "id": "https://review-service.com/system",
            "inbox": "https://review-service.com/inbox/",
            "type": "Service"
        },
        "target": {
            "id": "https://research-organisation.org/repository",
            "inbox": "https://research-organisation.org/inbox/",
            "type": "Service"
        }
    })
}
