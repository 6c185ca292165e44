//! In-process message store.
//!
//! Every operation takes the map lock once, so each call is atomic with
//! respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{ExpectedState, MessageStore, RecordUpdate, StatusCounts, StoreError, StoreResult};
use crate::models::MessageRecord;
use crate::state_machine::QueueStatus;

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: RwLock<HashMap<String, MessageRecord>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn sorted_by<F>(
        &self,
        mut filter: F,
        limit: usize,
        key: fn(&MessageRecord) -> DateTime<Utc>,
    ) -> Vec<MessageRecord>
    where
        F: FnMut(&MessageRecord) -> bool,
    {
        let records = self.records.read();
        let mut matching: Vec<MessageRecord> =
            records.values().filter(|r| filter(r)).cloned().collect();
        matching.sort_by(|a, b| key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(limit);
        matching
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_if_absent(&self, record: MessageRecord) -> StoreResult<(MessageRecord, bool)> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&record.id) {
            return Ok((existing.clone(), false));
        }
        records.insert(record.id.clone(), record.clone());
        Ok((record, true))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MessageRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn compare_and_set(
        &self,
        id: &str,
        expected: ExpectedState,
        update: RecordUpdate,
    ) -> StoreResult<MessageRecord> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        if !expected.matches(stored) {
            return Err(StoreError::ConcurrentModification {
                id: id.to_string(),
                expected: expected.to_string(),
                actual: ExpectedState::of(stored).to_string(),
            });
        }
        if update.attempts < stored.attempts {
            return Err(StoreError::AttemptsRegression {
                id: id.to_string(),
                stored: stored.attempts,
                requested: update.attempts,
            });
        }

        *stored = update.apply_to(stored);
        Ok(stored.clone())
    }

    async fn find_due(
        &self,
        status: QueueStatus,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>> {
        Ok(self.sorted_by(
            |r| r.queue_status == status && r.is_due(before),
            limit,
            MessageRecord::due_at,
        ))
    }

    async fn list_by_status(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>> {
        Ok(self.sorted_by(|r| r.queue_status == status, limit, |r| r.created_at))
    }

    async fn count_by_status(&self) -> StoreResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for record in self.records.read().values() {
            counts.add(record.queue_status, 1);
        }
        Ok(counts)
    }
}
