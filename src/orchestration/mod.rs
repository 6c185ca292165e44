//! # Delivery Orchestration
//!
//! Routing, processing and retry of accepted notifications.
//!
//! ## Core Components
//!
//! - **Router**: first-match selection over the ordered processor registry
//! - **MatchRule / RuleProcessor**: declarative type predicates around a processor
//! - **DeliveryCoordinator**: per-message serialization, processor invocation,
//!   state machine validation and compare-and-set persistence
//! - **RetryScheduler**: background loop re-attempting due `QUEUED_FOR_RETRY` records
//! - **BackoffCalculator**: retry delays and attempt limits
//!
//! ```text
//! inbox ──▶ DeliveryCoordinator ──▶ Router ──▶ Processor
//!               ▲        │
//! RetryScheduler┘        └──▶ MessageStore (CAS)
//! ```

pub mod backoff_calculator;
pub mod delivery_coordinator;
pub mod matching;
pub mod processor;
pub mod retry_scheduler;
pub mod router;

pub use backoff_calculator::{BackoffCalculator, ExponentialBackoff, FixedInterval, RetryPolicy};
pub use delivery_coordinator::{DeliveryCoordinator, DeliveryOutcome, ForceRetryOutcome};
pub use matching::{MatchRule, RuleProcessor, TypePattern};
pub use processor::{Processor, ProcessorError, ProcessorOutcome, ProcessorResult};
pub use retry_scheduler::{RetryCycleReport, RetryScheduler, RetrySchedulerSettings};
pub use router::{RouteDecision, Router};
