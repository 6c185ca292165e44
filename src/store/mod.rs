//! # Message Store
//!
//! System of record for every accepted notification and its queue status.
//!
//! ## Guarantees
//!
//! - **Idempotent create**: [`MessageStore::insert_if_absent`] never creates a
//!   second record for an id that already exists.
//! - **Compare-and-set updates**: [`MessageStore::compare_and_set`] only writes
//!   when the stored record still has the status and attempt count the caller
//!   read, so a stale writer is rejected instead of overwriting newer state.
//! - **Monotonic attempts**: an update that would lower `attempts` is refused.
//!
//! Two implementations are provided: [`InMemoryMessageStore`] for embedded use
//! and tests, and `PgMessageStore` (feature `postgres`) backed by `sqlx`.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MessageRecord;
use crate::state_machine::QueueStatus;

pub use memory::InMemoryMessageStore;
#[cfg(feature = "postgres")]
pub use postgres::PgMessageStore;

/// Errors raised by message store implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Message record not found: {id}")]
    NotFound { id: String },

    #[error("Concurrent modification detected for message {id}: expected {expected}, found {actual}")]
    ConcurrentModification {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Attempt counter for message {id} cannot decrease from {stored} to {requested}")]
    AttemptsRegression {
        id: String,
        stored: u32,
        requested: u32,
    },

    #[error("Invalid stored data for message {id}: {reason}")]
    InvalidData { id: String, reason: String },

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "postgres")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The version of a record a writer based its decision on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedState {
    pub queue_status: QueueStatus,
    pub attempts: u32,
}

impl ExpectedState {
    pub fn of(record: &MessageRecord) -> Self {
        Self {
            queue_status: record.queue_status,
            attempts: record.attempts,
        }
    }

    pub fn matches(&self, record: &MessageRecord) -> bool {
        self.queue_status == record.queue_status && self.attempts == record.attempts
    }
}

impl std::fmt::Display for ExpectedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} after {} attempt(s)", self.queue_status, self.attempts)
    }
}

/// New values for the mutable part of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub queue_status: QueueStatus,
    pub attempts: u32,
    pub processor_id: Option<String>,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RecordUpdate {
    /// Start from the record's current values
    pub fn from_record(record: &MessageRecord, now: DateTime<Utc>) -> Self {
        Self {
            queue_status: record.queue_status,
            attempts: record.attempts,
            processor_id: record.processor_id.clone(),
            last_error: record.last_error.clone(),
            last_attempt_at: record.last_attempt_at,
            next_retry_at: record.next_retry_at,
            updated_at: now,
        }
    }

    /// Apply the update to a record, returning the new version
    pub fn apply_to(&self, record: &MessageRecord) -> MessageRecord {
        MessageRecord {
            queue_status: self.queue_status,
            attempts: self.attempts,
            processor_id: self.processor_id.clone(),
            last_error: self.last_error.clone(),
            last_attempt_at: self.last_attempt_at,
            next_retry_at: self.next_retry_at,
            updated_at: self.updated_at,
            ..record.clone()
        }
    }
}

/// Number of records per queue status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub untried: u64,
    pub processed: u64,
    pub failed: u64,
    pub queued_for_retry: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: QueueStatus, count: u64) {
        match status {
            QueueStatus::Untried => self.untried += count,
            QueueStatus::Processed => self.processed += count,
            QueueStatus::Failed => self.failed += count,
            QueueStatus::QueuedForRetry => self.queued_for_retry += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.untried + self.processed + self.failed + self.queued_for_retry
    }
}

/// Durable storage for message records
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert the record unless one with the same id exists.
    ///
    /// Returns the stored record and whether this call created it.
    async fn insert_if_absent(&self, record: MessageRecord) -> StoreResult<(MessageRecord, bool)>;

    async fn get(&self, id: &str) -> StoreResult<Option<MessageRecord>>;

    /// Write `update` only if the stored record still matches `expected`
    async fn compare_and_set(
        &self,
        id: &str,
        expected: ExpectedState,
        update: RecordUpdate,
    ) -> StoreResult<MessageRecord>;

    /// Records in `status` that became due at or before `before`, oldest first
    async fn find_due(
        &self,
        status: QueueStatus,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>>;

    /// Records in `status`, oldest first
    async fn list_by_status(&self, status: QueueStatus, limit: usize)
        -> StoreResult<Vec<MessageRecord>>;

    async fn count_by_status(&self) -> StoreResult<StatusCounts>;
}
