//! # PostgreSQL Message Store
//!
//! `sqlx`-backed implementation of [`MessageStore`] over the `ldn_messages`
//! table created by `migrations/`.
//!
//! ## Concurrency
//!
//! - `insert_if_absent` relies on the primary key with `ON CONFLICT DO NOTHING`,
//!   so concurrent first receipts of the same id create exactly one row.
//! - `compare_and_set` is a single `UPDATE ... WHERE queue_status = $n AND
//!   attempts = $m`; zero affected rows means another writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tracing::info;

use super::{ExpectedState, MessageStore, RecordUpdate, StatusCounts, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::models::{MessageRecord, Notification};
use crate::state_machine::QueueStatus;

/// Migrations shipped with the crate
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SELECT_COLUMNS: &str = "id, envelope, queue_status, attempts, processor_id, last_error, \
     created_at, last_attempt_at, next_retry_at, updated_at";

/// Row shape of `ldn_messages`
#[derive(Debug, Clone, FromRow)]
struct MessageRow {
    id: String,
    envelope: serde_json::Value,
    queue_status: String,
    attempts: i32,
    processor_id: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let queue_status: QueueStatus =
            row.queue_status
                .parse()
                .map_err(|reason: String| StoreError::InvalidData {
                    id: row.id.clone(),
                    reason,
                })?;
        let attempts = u32::try_from(row.attempts).map_err(|_| StoreError::InvalidData {
            id: row.id.clone(),
            reason: format!("negative attempt count {}", row.attempts),
        })?;
        let envelope: Notification = serde_json::from_value(row.envelope)?;

        Ok(MessageRecord {
            id: row.id,
            envelope: Arc::new(envelope),
            queue_status,
            attempts,
            processor_id: row.processor_id,
            last_error: row.last_error,
            created_at: row.created_at,
            last_attempt_at: row.last_attempt_at,
            next_retry_at: row.next_retry_at,
            updated_at: row.updated_at,
        })
    }
}

fn attempts_param(id: &str, attempts: u32) -> StoreResult<i32> {
    i32::try_from(attempts).map_err(|_| StoreError::InvalidData {
        id: id.to_string(),
        reason: format!("attempt count {attempts} out of range"),
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Message store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using the `[database]` configuration section
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url = config.url.as_deref().ok_or_else(|| StoreError::InvalidData {
            id: "-".to_string(),
            reason: "database.url is not configured".to_string(),
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            acquire_timeout_seconds = config.acquire_timeout_seconds,
            "🗄️ Message store connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, id: &str) -> StoreResult<Option<MessageRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM ldn_messages WHERE id = $1");
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(MessageRecord::try_from)
            .transpose()
    }

    fn collect(rows: Vec<MessageRow>) -> StoreResult<Vec<MessageRecord>> {
        rows.into_iter().map(MessageRecord::try_from).collect()
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert_if_absent(&self, record: MessageRecord) -> StoreResult<(MessageRecord, bool)> {
        let envelope = serde_json::to_value(record.envelope.as_ref())?;
        let sql = format!(
            "INSERT INTO ldn_messages ({SELECT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {SELECT_COLUMNS}"
        );

        let inserted = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(&record.id)
            .bind(envelope)
            .bind(record.queue_status.as_str())
            .bind(attempts_param(&record.id, record.attempts)?)
            .bind(&record.processor_id)
            .bind(&record.last_error)
            .bind(record.created_at)
            .bind(record.last_attempt_at)
            .bind(record.next_retry_at)
            .bind(record.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => Ok((MessageRecord::try_from(row)?, true)),
            None => {
                let existing = self
                    .fetch(&record.id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        id: record.id.clone(),
                    })?;
                Ok((existing, false))
            }
        }
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MessageRecord>> {
        self.fetch(id).await
    }

    async fn compare_and_set(
        &self,
        id: &str,
        expected: ExpectedState,
        update: RecordUpdate,
    ) -> StoreResult<MessageRecord> {
        if update.attempts < expected.attempts {
            return Err(StoreError::AttemptsRegression {
                id: id.to_string(),
                stored: expected.attempts,
                requested: update.attempts,
            });
        }

        let sql = format!(
            "UPDATE ldn_messages SET \
               queue_status = $4, attempts = $5, processor_id = $6, last_error = $7, \
               last_attempt_at = $8, next_retry_at = $9, updated_at = $10 \
             WHERE id = $1 AND queue_status = $2 AND attempts = $3 \
             RETURNING {SELECT_COLUMNS}"
        );

        let updated = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .bind(expected.queue_status.as_str())
            .bind(attempts_param(id, expected.attempts)?)
            .bind(update.queue_status.as_str())
            .bind(attempts_param(id, update.attempts)?)
            .bind(&update.processor_id)
            .bind(&update.last_error)
            .bind(update.last_attempt_at)
            .bind(update.next_retry_at)
            .bind(update.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => MessageRecord::try_from(row),
            None => match self.fetch(id).await? {
                Some(current) => Err(StoreError::ConcurrentModification {
                    id: id.to_string(),
                    expected: expected.to_string(),
                    actual: ExpectedState::of(&current).to_string(),
                }),
                None => Err(StoreError::NotFound { id: id.to_string() }),
            },
        }
    }

    async fn find_due(
        &self,
        status: QueueStatus,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM ldn_messages \
             WHERE queue_status = $1 \
               AND COALESCE(next_retry_at, last_attempt_at, created_at) <= $2 \
             ORDER BY COALESCE(next_retry_at, last_attempt_at, created_at), id \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(status.as_str())
            .bind(before)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        Self::collect(rows)
    }

    async fn list_by_status(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM ldn_messages \
             WHERE queue_status = $1 ORDER BY created_at, id LIMIT $2"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(status.as_str())
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        Self::collect(rows)
    }

    async fn count_by_status(&self) -> StoreResult<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT queue_status, COUNT(*) FROM ldn_messages GROUP BY queue_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let status: QueueStatus = status
                .parse()
                .map_err(|reason: String| StoreError::InvalidData {
                    id: "-".to_string(),
                    reason,
                })?;
            counts.add(status, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }
}
