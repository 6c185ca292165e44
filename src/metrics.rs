//! # Delivery Metrics
//!
//! Lock-free counters for the delivery pipeline, exposed through the health
//! endpoint. Retry exhaustion has no synchronous caller, so these counters and
//! the accompanying `warn` logs are how it is surfaced.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the delivery coordinator and retry scheduler
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    received: AtomicU64,
    duplicates: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    unrouted: AtomicU64,
    queued: AtomicU64,
    exhausted: AtomicU64,
    timeouts: AtomicU64,
    faults: AtomicU64,
    forced_retries: AtomicU64,
    scheduler_cycles: AtomicU64,
}

/// Point-in-time copy of [`DeliveryMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMetricsSnapshot {
    pub received: u64,
    pub duplicates: u64,
    pub processed: u64,
    pub failed: u64,
    pub unrouted: u64,
    pub queued: u64,
    pub exhausted: u64,
    pub timeouts: u64,
    pub faults: u64,
    pub forced_retries: u64,
    pub scheduler_cycles: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// A receipt that found an existing record for its id
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Permanent processor failure
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Processor returned an error or panicked
    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_retry(&self) {
        self.forced_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scheduler_cycle(&self) {
        self.scheduler_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryMetricsSnapshot {
        DeliveryMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            forced_retries: self.forced_retries.load(Ordering::Relaxed),
            scheduler_cycles: self.scheduler_cycles.load(Ordering::Relaxed),
        }
    }
}
