//! # Delivery Coordinator
//!
//! Drives one message through receive → route → process → persist.
//!
//! ## Overview
//!
//! Both the inbound endpoint and the retry scheduler converge here. For any
//! single message id at most one attempt is in flight: a per-id async mutex is
//! held across the whole lookup → route → process → persist sequence, so a
//! live receipt racing a scheduled retry simply waits and then sees the
//! outcome of the first attempt. Different ids proceed concurrently.
//!
//! ## Outcome recording
//!
//! Every status change is validated by [`MessageStateMachine`] and written
//! with one compare-and-set, keyed on the status and attempt count the
//! decision was based on. Processor faults never escape: errors, panics and
//! overruns of the processor timeout all become transient failures.
//!
//! ## Usage
//!
//! ```rust
//! use ldn_core::orchestration::{BackoffCalculator, DeliveryCoordinator, DeliveryOutcome, MatchRule, Router, RuleProcessor};
//! use ldn_core::processors::AcknowledgeProcessor;
//! use ldn_core::registry::ProcessorRegistry;
//! use ldn_core::store::InMemoryMessageStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProcessorRegistry::new().with(Arc::new(RuleProcessor::new(
//!     "offers",
//!     MatchRule::for_types(["Offer"]),
//!     Arc::new(AcknowledgeProcessor::new("ack")),
//! )))?;
//! let coordinator = DeliveryCoordinator::new(
//!     Arc::new(InMemoryMessageStore::new()),
//!     Router::new(Arc::new(registry)),
//!     BackoffCalculator::default(),
//! );
//!
//! let outcome = coordinator
//!     .submit(json!({ "id": "m1", "type": "Offer:ReviewOffer" }))
//!     .await?;
//! assert!(matches!(outcome, DeliveryOutcome::Processed(_)));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::backoff_calculator::BackoffCalculator;
use super::processor::{Processor, ProcessorOutcome};
use super::router::{RouteDecision, Router};
use crate::config::LdnConfig;
use crate::constants::{PROCESSOR_TIMEOUT, RETRY_EXHAUSTED};
use crate::error::Result;
use crate::logging::log_message_operation;
use crate::metrics::DeliveryMetrics;
use crate::models::{IdPolicy, MessageRecord, Notification};
use crate::state_machine::{MessageEvent, MessageStateMachine, QueueStatus};
use crate::store::{ExpectedState, MessageStore, RecordUpdate, StoreResult};

const DEFAULT_PROCESSOR_TIMEOUT: Duration = Duration::from_secs(30);

/// What happened to a message on this call
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// A processor succeeded
    Processed(MessageRecord),
    /// A processor reported a permanent failure
    Failed(MessageRecord),
    /// No processor matched
    Unrouted(MessageRecord),
    /// Transient failure on the last permitted attempt
    Exhausted(MessageRecord),
    /// Transient failure; the retry scheduler will pick it up
    Queued(MessageRecord),
}

impl DeliveryOutcome {
    /// Outcome implied by a stored record, used when replaying duplicates
    pub fn from_record(record: MessageRecord) -> Self {
        match record.queue_status {
            QueueStatus::Processed => Self::Processed(record),
            QueueStatus::Failed if record.is_unrouted() => Self::Unrouted(record),
            QueueStatus::Failed
                if record
                    .last_error
                    .as_deref()
                    .is_some_and(|e| e.starts_with(RETRY_EXHAUSTED)) =>
            {
                Self::Exhausted(record)
            }
            QueueStatus::Failed => Self::Failed(record),
            QueueStatus::Untried | QueueStatus::QueuedForRetry => Self::Queued(record),
        }
    }

    pub fn record(&self) -> &MessageRecord {
        match self {
            Self::Processed(record)
            | Self::Failed(record)
            | Self::Unrouted(record)
            | Self::Exhausted(record)
            | Self::Queued(record) => record,
        }
    }

    pub fn into_record(self) -> MessageRecord {
        match self {
            Self::Processed(record)
            | Self::Failed(record)
            | Self::Unrouted(record)
            | Self::Exhausted(record)
            | Self::Queued(record) => record,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Processed(_) => "processed",
            Self::Failed(_) => "failed",
            Self::Unrouted(_) => "unrouted",
            Self::Exhausted(_) => "exhausted",
            Self::Queued(_) => "queued",
        }
    }
}

/// Result of the operator "force retry" action
#[derive(Debug, Clone, PartialEq)]
pub enum ForceRetryOutcome {
    NotFound,
    /// Processed messages are never re-run; the record is unchanged
    AlreadyProcessed(MessageRecord),
    Queued(MessageRecord),
}

/// Holds the per-id mutex; drops the map entry when nobody else is waiting
struct MessageLockGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MessageLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct DeliveryCoordinator {
    store: Arc<dyn MessageStore>,
    router: Router,
    backoff: BackoffCalculator,
    state_machine: MessageStateMachine,
    metrics: Arc<DeliveryMetrics>,
    processor_timeout: Duration,
    stale_after: Option<Duration>,
    id_policy: IdPolicy,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DeliveryCoordinator {
    pub fn new(store: Arc<dyn MessageStore>, router: Router, backoff: BackoffCalculator) -> Self {
        Self {
            store,
            router,
            backoff,
            state_machine: MessageStateMachine::new(),
            metrics: Arc::new(DeliveryMetrics::new()),
            processor_timeout: DEFAULT_PROCESSOR_TIMEOUT,
            stale_after: None,
            id_policy: IdPolicy::default(),
            locks: DashMap::new(),
        }
    }

    /// Coordinator configured from the `processor`, `retry`, `scheduler` and `inbox` sections
    pub fn from_config(config: &LdnConfig, store: Arc<dyn MessageStore>, router: Router) -> Self {
        let id_policy = if config.inbox.generate_missing_ids {
            IdPolicy::GenerateIfMissing
        } else {
            IdPolicy::Require
        };

        Self::new(store, router, BackoffCalculator::from_config(&config.retry))
            .with_processor_timeout(config.processor.timeout())
            .with_stale_after(config.scheduler.stale_after())
            .with_id_policy(id_policy)
    }

    pub fn with_processor_timeout(mut self, timeout: Duration) -> Self {
        self.processor_timeout = timeout;
        self
    }

    /// Age at which an `UNTRIED` record counts as abandoned. Defaults to four
    /// processor timeouts.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    pub fn with_id_policy(mut self, id_policy: IdPolicy) -> Self {
        self.id_policy = id_policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DeliveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<DeliveryMetrics> {
        &self.metrics
    }

    pub fn backoff(&self) -> &BackoffCalculator {
        &self.backoff
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
            .unwrap_or_else(|| self.processor_timeout.saturating_mul(4))
    }

    /// `UNTRIED` records last written at or before this instant were
    /// abandoned by an attempt that never persisted its outcome
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.stale_after())
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Ids currently holding or waiting on a per-message lock
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<MessageRecord>> {
        self.store.get(id).await
    }

    /// Validate a submitted document and deliver it
    pub async fn submit(&self, document: Value) -> Result<DeliveryOutcome> {
        let notification = Notification::from_document(document, self.id_policy)?;
        self.receive(Arc::new(notification)).await
    }

    /// Deliver an accepted envelope
    ///
    /// A first receipt creates the record and processes it. A duplicate of a
    /// terminal record replays the stored outcome; a duplicate of a pending
    /// record continues processing it once any in-flight attempt finishes.
    pub async fn receive(&self, envelope: Arc<Notification>) -> Result<DeliveryOutcome> {
        self.metrics.record_received();
        let id = envelope.id.clone();
        let _lock = self.lock_message(&id).await;

        let (record, created) = self
            .store
            .insert_if_absent(MessageRecord::new(envelope, Utc::now()))
            .await?;

        if !created {
            self.metrics.record_duplicate();
            if record.is_terminal() {
                debug!(
                    message_id = %id,
                    status = %record.queue_status,
                    "Duplicate receipt of a finished message; replaying stored outcome"
                );
                return Ok(DeliveryOutcome::from_record(record));
            }
            debug!(
                message_id = %id,
                status = %record.queue_status,
                attempts = record.attempts,
                "Duplicate receipt of a pending message; continuing processing"
            );
        } else {
            log_message_operation("receive", &id, None, record.queue_status.as_str(), 0, None);
        }

        self.process_record(record).await
    }

    /// Re-attempt a message that is queued and due at `now`, or that is still
    /// `UNTRIED` past the stale cutoff (its first attempt was dropped or the
    /// process died before the outcome was written)
    ///
    /// Returns `None` when the message is unknown or no longer eligible
    /// (another path handled it first).
    pub async fn retry_if_due(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryOutcome>> {
        let _lock = self.lock_message(id).await;

        let Some(record) = self.store.get(id).await? else {
            return Ok(None);
        };
        let eligible = match record.queue_status {
            QueueStatus::QueuedForRetry => record.is_due(now),
            QueueStatus::Untried => record.updated_at <= self.stale_cutoff(now),
            QueueStatus::Processed | QueueStatus::Failed => false,
        };
        if !eligible {
            debug!(
                message_id = %id,
                status = %record.queue_status,
                "Skipping retry; message no longer due"
            );
            return Ok(None);
        }

        if record.queue_status == QueueStatus::Untried {
            warn!(
                message_id = %id,
                created_at = %record.created_at,
                "Recovering abandoned message that was never attempted to completion"
            );
        }
        self.process_record(record).await.map(Some)
    }

    /// Operator override: queue any message that is not `PROCESSED` for an
    /// immediate retry
    pub async fn force_retry(&self, id: &str) -> Result<ForceRetryOutcome> {
        let _lock = self.lock_message(id).await;

        let Some(record) = self.store.get(id).await? else {
            return Ok(ForceRetryOutcome::NotFound);
        };
        if record.queue_status == QueueStatus::Processed {
            return Ok(ForceRetryOutcome::AlreadyProcessed(record));
        }

        let now = Utc::now();
        let event = MessageEvent::ForceRetry;
        let target = self
            .state_machine
            .determine_target_state(record.queue_status, &event)?;

        let mut update = RecordUpdate::from_record(&record, now);
        update.queue_status = target;
        update.next_retry_at = Some(now);

        let updated = self
            .store
            .compare_and_set(id, ExpectedState::of(&record), update)
            .await?;

        self.metrics.record_forced_retry();
        info!(
            message_id = %id,
            from = %record.queue_status,
            attempts = updated.attempts,
            "🔁 Manual retry requested"
        );
        Ok(ForceRetryOutcome::Queued(updated))
    }

    async fn lock_message(&self, id: &str) -> MessageLockGuard<'_> {
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        MessageLockGuard {
            locks: &self.locks,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Route, process and persist one attempt; caller holds the message lock
    async fn process_record(&self, record: MessageRecord) -> Result<DeliveryOutcome> {
        let started_at = Utc::now();

        let processor = match self.router.route(&record.envelope) {
            RouteDecision::Matched(processor) => processor,
            RouteDecision::NoMatch => return self.record_unrouted(record, started_at).await,
        };

        let outcome = self.invoke(processor.as_ref(), &record.envelope).await;
        let attempts = record.attempts.saturating_add(1);

        let event = match outcome {
            ProcessorOutcome::Success => MessageEvent::Succeed,
            ProcessorOutcome::PermanentFailure(reason) => MessageEvent::FailPermanently(reason),
            ProcessorOutcome::TransientFailure(reason) if self.backoff.is_exhausted(attempts) => {
                MessageEvent::Exhaust(reason)
            }
            ProcessorOutcome::TransientFailure(reason) => MessageEvent::RequeueTransient(reason),
        };
        let target = self
            .state_machine
            .determine_target_state(record.queue_status, &event)?;

        let finished_at = Utc::now();
        let mut update = RecordUpdate::from_record(&record, finished_at);
        update.queue_status = target;
        update.attempts = attempts;
        update.processor_id = Some(processor.id().to_string());
        update.last_attempt_at = Some(started_at);
        update.last_error = match &event {
            MessageEvent::Exhaust(reason) => Some(format!("{RETRY_EXHAUSTED}: {reason}")),
            other => other.reason().map(str::to_string),
        };
        update.next_retry_at = match event {
            MessageEvent::RequeueTransient(_) => {
                Some(self.backoff.next_retry_at(attempts, finished_at))
            }
            _ => None,
        };

        let updated = self
            .store
            .compare_and_set(&record.id, ExpectedState::of(&record), update)
            .await?;

        log_message_operation(
            event.event_type(),
            &updated.id,
            updated.processor_id.as_deref(),
            updated.queue_status.as_str(),
            updated.attempts,
            updated.last_error.as_deref(),
        );

        Ok(match event {
            MessageEvent::Succeed => {
                self.metrics.record_processed();
                DeliveryOutcome::Processed(updated)
            }
            MessageEvent::FailPermanently(_) => {
                self.metrics.record_failed();
                DeliveryOutcome::Failed(updated)
            }
            MessageEvent::Exhaust(_) => {
                self.metrics.record_exhausted();
                warn!(
                    message_id = %updated.id,
                    processor_id = updated.processor_id.as_deref(),
                    attempts = updated.attempts,
                    max_attempts = self.backoff.max_attempts(),
                    last_error = updated.last_error.as_deref(),
                    "⚠️ Retry attempts exhausted; message marked FAILED"
                );
                DeliveryOutcome::Exhausted(updated)
            }
            _ => {
                self.metrics.record_queued();
                debug!(
                    message_id = %updated.id,
                    next_retry_at = ?updated.next_retry_at,
                    "Message queued for retry"
                );
                DeliveryOutcome::Queued(updated)
            }
        })
    }

    async fn record_unrouted(
        &self,
        record: MessageRecord,
        started_at: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let event = MessageEvent::Unroutable;
        let target = self
            .state_machine
            .determine_target_state(record.queue_status, &event)?;

        let mut update = RecordUpdate::from_record(&record, Utc::now());
        update.queue_status = target;
        update.processor_id = None;
        update.last_error = event.reason().map(str::to_string);
        update.last_attempt_at = Some(started_at);
        update.next_retry_at = None;

        let updated = self
            .store
            .compare_and_set(&record.id, ExpectedState::of(&record), update)
            .await?;

        self.metrics.record_unrouted();
        warn!(
            message_id = %updated.id,
            types = ?updated.envelope.notification_type,
            "🚫 No processor matched notification"
        );
        Ok(DeliveryOutcome::Unrouted(updated))
    }

    /// Run the processor with fault isolation and a time limit
    ///
    /// On timeout the processor future is dropped at its next await point and
    /// its result discarded.
    async fn invoke(
        &self,
        processor: &dyn Processor,
        notification: &Notification,
    ) -> ProcessorOutcome {
        let attempt = AssertUnwindSafe(processor.process(notification)).catch_unwind();

        match tokio::time::timeout(self.processor_timeout, attempt).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(error))) => {
                self.metrics.record_fault();
                warn!(
                    processor_id = processor.id(),
                    message_id = %notification.id,
                    error = %error,
                    "Processor returned an error; treating as transient"
                );
                ProcessorOutcome::TransientFailure(error.to_string())
            }
            Ok(Err(panic)) => {
                self.metrics.record_fault();
                let detail = format!("processor panicked: {}", panic_message(panic.as_ref()));
                warn!(
                    processor_id = processor.id(),
                    message_id = %notification.id,
                    error = %detail,
                    "Processor panicked; treating as transient"
                );
                ProcessorOutcome::TransientFailure(detail)
            }
            Err(_) => {
                self.metrics.record_timeout();
                warn!(
                    processor_id = processor.id(),
                    message_id = %notification.id,
                    timeout_ms = self.processor_timeout.as_millis() as u64,
                    "⏱️ Processor timed out"
                );
                ProcessorOutcome::TransientFailure(PROCESSOR_TIMEOUT.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::matching::{MatchRule, RuleProcessor};
    use crate::orchestration::processor::ProcessorResult;
    use crate::processors::AcknowledgeProcessor;
    use crate::registry::ProcessorRegistry;
    use crate::store::InMemoryMessageStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Panicking;

    #[async_trait]
    impl Processor for Panicking {
        fn id(&self) -> &str {
            "panicking"
        }

        fn matches(&self, _notification: &Notification) -> bool {
            true
        }

        async fn process(&self, _notification: &Notification) -> ProcessorResult {
            panic!("boom");
        }
    }

    fn coordinator(processor: Arc<dyn Processor>) -> DeliveryCoordinator {
        let registry = ProcessorRegistry::new().with(processor).unwrap();
        DeliveryCoordinator::new(
            Arc::new(InMemoryMessageStore::new()),
            Router::new(Arc::new(registry)),
            BackoffCalculator::default(),
        )
    }

    fn offers() -> Arc<dyn Processor> {
        Arc::new(RuleProcessor::new(
            "offers",
            MatchRule::for_types(["Offer"]),
            Arc::new(AcknowledgeProcessor::new("ack")),
        ))
    }

    #[tokio::test]
    async fn test_success_marks_processed() {
        let coordinator = coordinator(offers());
        let outcome = coordinator
            .submit(json!({ "id": "m1", "type": "Offer:ReviewOffer" }))
            .await
            .unwrap();

        let record = outcome.record();
        assert!(matches!(outcome, DeliveryOutcome::Processed(_)));
        assert_eq!(record.queue_status, QueueStatus::Processed);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.processor_id.as_deref(), Some("offers"));
        assert_eq!(coordinator.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_malformed_document_is_not_persisted() {
        let coordinator = coordinator(offers());
        let err = coordinator.submit(json!({ "type": "Offer" })).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(
            coordinator.store().count_by_status().await.unwrap().total(),
            0
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_transient_failure() {
        let coordinator = coordinator(Arc::new(Panicking));
        let outcome = coordinator
            .submit(json!({ "id": "m1", "type": "Offer" }))
            .await
            .unwrap();

        let record = outcome.record();
        assert_eq!(record.queue_status, QueueStatus::QueuedForRetry);
        assert_eq!(record.last_error.as_deref(), Some("processor panicked: boom"));
        assert!(record.next_retry_at.is_some());
        assert_eq!(coordinator.metrics().snapshot().faults, 1);
    }

    #[tokio::test]
    async fn test_force_retry_transitions() {
        let coordinator = coordinator(offers());
        assert_eq!(
            coordinator.force_retry("missing").await.unwrap(),
            ForceRetryOutcome::NotFound
        );

        coordinator
            .submit(json!({ "id": "m1", "type": "Offer" }))
            .await
            .unwrap();
        assert!(matches!(
            coordinator.force_retry("m1").await.unwrap(),
            ForceRetryOutcome::AlreadyProcessed(_)
        ));

        let unrouted = coordinator
            .submit(json!({ "id": "m2", "type": "Unknown" }))
            .await
            .unwrap();
        assert!(matches!(unrouted, DeliveryOutcome::Unrouted(_)));

        match coordinator.force_retry("m2").await.unwrap() {
            ForceRetryOutcome::Queued(record) => {
                assert_eq!(record.queue_status, QueueStatus::QueuedForRetry);
                assert!(record.next_retry_at.is_some());
            }
            other => panic!("expected queued record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abandoned_untried_record_is_recovered_after_stale_cutoff() {
        let coordinator = coordinator(offers()).with_stale_after(Duration::from_secs(60));
        let envelope = Notification::parse(json!({ "id": "m1", "type": "Offer" })).unwrap();
        let created_at = Utc::now();
        coordinator
            .store()
            .insert_if_absent(MessageRecord::new(Arc::new(envelope), created_at))
            .await
            .unwrap();

        let early = created_at + chrono::Duration::seconds(30);
        assert!(coordinator.retry_if_due("m1", early).await.unwrap().is_none());

        let late = created_at + chrono::Duration::seconds(61);
        let outcome = coordinator.retry_if_due("m1", late).await.unwrap().unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Processed(_)));
        assert_eq!(outcome.record().attempts, 1);
    }

    #[test]
    fn test_stale_after_defaults_to_multiple_of_processor_timeout() {
        let coordinator =
            coordinator(offers()).with_processor_timeout(Duration::from_millis(250));
        assert_eq!(coordinator.stale_after(), Duration::from_secs(1));

        let now = Utc::now();
        assert_eq!(
            coordinator.stale_cutoff(now),
            now - chrono::Duration::seconds(1)
        );
    }

    #[test]
    fn test_outcome_from_record() {
        let envelope = Notification::parse(json!({ "id": "m1", "type": "Offer" })).unwrap();
        let mut record = MessageRecord::new(Arc::new(envelope), Utc::now());
        assert!(matches!(
            DeliveryOutcome::from_record(record.clone()),
            DeliveryOutcome::Queued(_)
        ));

        record.queue_status = QueueStatus::Failed;
        assert!(matches!(
            DeliveryOutcome::from_record(record.clone()),
            DeliveryOutcome::Unrouted(_)
        ));

        record.processor_id = Some("offers".to_string());
        record.last_error = Some(format!("{RETRY_EXHAUSTED}: timeout"));
        assert!(matches!(
            DeliveryOutcome::from_record(record.clone()),
            DeliveryOutcome::Exhausted(_)
        ));

        record.last_error = Some("bad request".to_string());
        assert_eq!(DeliveryOutcome::from_record(record).label(), "failed");
    }
}
