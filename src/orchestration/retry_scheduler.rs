//! # Retry Scheduler
//!
//! Background loop that re-attempts messages in `QUEUED_FOR_RETRY` once their
//! backoff has elapsed, and `UNTRIED` messages whose first attempt never wrote
//! an outcome (dropped request, crash) once they pass the stale cutoff.
//!
//! Each cycle asks the store for due records and hands every id to
//! [`DeliveryCoordinator::retry_if_due`], which re-checks the record under the
//! per-message lock. A record that a live receipt or an operator already
//! handled is skipped, so the scheduler never double-processes.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::delivery_coordinator::{DeliveryCoordinator, DeliveryOutcome};
use crate::config::SchedulerConfig;
use crate::error::{LdnError, Result};
use crate::logging::log_error;
use crate::state_machine::QueueStatus;

const ERROR_RECOVERY_WAIT: Duration = Duration::from_secs(1);

/// Tally of one scheduler cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryCycleReport {
    pub due: usize,
    /// Abandoned `UNTRIED` records among `due`
    pub stale: usize,
    pub processed: usize,
    pub failed: usize,
    pub exhausted: usize,
    pub requeued: usize,
    pub unrouted: usize,
    /// Due when listed but handled elsewhere before the lock was acquired
    pub skipped: usize,
    pub errors: usize,
}

impl RetryCycleReport {
    fn record(&mut self, result: &Result<Option<DeliveryOutcome>>) {
        match result {
            Ok(Some(DeliveryOutcome::Processed(_))) => self.processed += 1,
            Ok(Some(DeliveryOutcome::Failed(_))) => self.failed += 1,
            Ok(Some(DeliveryOutcome::Exhausted(_))) => self.exhausted += 1,
            Ok(Some(DeliveryOutcome::Queued(_))) => self.requeued += 1,
            Ok(Some(DeliveryOutcome::Unrouted(_))) => self.unrouted += 1,
            Ok(None) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySchedulerSettings {
    pub interval: Duration,
    pub batch_size: usize,
    pub max_concurrency: usize,
}

impl From<&SchedulerConfig> for RetrySchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            interval: config.interval(),
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
        }
    }
}

impl Default for RetrySchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

pub struct RetryScheduler {
    coordinator: Arc<DeliveryCoordinator>,
    settings: RetrySchedulerSettings,
    running: AtomicBool,
    stop_requested: AtomicBool,
    shutdown_notify: Notify,
}

impl RetryScheduler {
    pub fn new(coordinator: Arc<DeliveryCoordinator>, settings: RetrySchedulerSettings) -> Self {
        Self {
            coordinator,
            settings,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    pub fn settings(&self) -> &RetrySchedulerSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// One pass over the records due at `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<RetryCycleReport> {
        let store = self.coordinator.store();
        let mut due = store
            .find_due(QueueStatus::QueuedForRetry, now, self.settings.batch_size)
            .await?;
        let stale = store
            .find_due(
                QueueStatus::Untried,
                self.coordinator.stale_cutoff(now),
                self.settings.batch_size,
            )
            .await?;

        let mut report = RetryCycleReport {
            due: due.len() + stale.len(),
            stale: stale.len(),
            ..RetryCycleReport::default()
        };
        due.extend(stale);
        if due.is_empty() {
            self.coordinator.metrics().record_scheduler_cycle();
            return Ok(report);
        }

        let coordinator = &self.coordinator;
        let results: Vec<_> = stream::iter(due)
            .map(|record| async move {
                let result = coordinator.retry_if_due(&record.id, now).await;
                (record.id, result)
            })
            .buffer_unordered(self.settings.max_concurrency)
            .collect()
            .await;

        for (id, result) in &results {
            if let Err(e) = result {
                log_error("retry_scheduler", "retry_if_due", &e.to_string(), Some(id.as_str()));
            }
            report.record(result);
        }

        self.coordinator.metrics().record_scheduler_cycle();
        info!(
            due = report.due,
            stale = report.stale,
            processed = report.processed,
            requeued = report.requeued,
            exhausted = report.exhausted,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "🔄 Retry cycle complete"
        );
        Ok(report)
    }

    pub async fn run_cycle(&self) -> Result<RetryCycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Spawn the polling loop
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(LdnError::Orchestration(
                "Retry scheduler is already running".to_string(),
            ));
        }
        self.stop_requested.store(false, Ordering::Release);

        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            max_concurrency = self.settings.max_concurrency,
            "🚀 Starting retry scheduler"
        );

        let scheduler = Arc::clone(self);
        Ok(tokio::spawn(async move { scheduler.run().await }))
    }

    /// Ask the loop to exit after its current cycle and wait for it to do so
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        self.stop_requested.store(true, Ordering::Release);
        self.shutdown_notify.notify_one();

        tokio::time::timeout(timeout, async {
            while self.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| LdnError::Orchestration("Retry scheduler stop timeout".to_string()))
    }

    async fn run(&self) {
        while !self.stop_requested.load(Ordering::Acquire) {
            let wait = match self.run_cycle().await {
                Ok(report) => {
                    debug!(due = report.due, "Retry scheduler sleeping");
                    self.settings.interval
                }
                Err(e) => {
                    error!(error = %e, "Retry cycle failed");
                    ERROR_RECOVERY_WAIT
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = self.shutdown_notify.notified() => {
                    debug!("Shutdown notification received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        info!("🛑 Retry scheduler stopped");
    }
}
