//! PostgreSQL message store tests
//!
//! Need a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`
#![cfg(feature = "postgres")]

use chrono::{Duration as ChronoDuration, Utc};
use ldn_core::models::{MessageRecord, Notification};
use ldn_core::state_machine::QueueStatus;
use ldn_core::store::{ExpectedState, MessageStore, PgMessageStore, RecordUpdate, StoreError};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

fn record(id: &str) -> MessageRecord {
    let envelope = Notification::parse(json!({
        "id": id,
        "type": ["Announce", "coar-notify:ReviewAction"],
        "object": { "id": "https://review.example/r/1", "type": "sorg:Review" }
    }))
    .unwrap();
    MessageRecord::new(Arc::new(envelope), Utc::now())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_insert_if_absent_is_idempotent(pool: PgPool) {
    let store = PgMessageStore::new(pool);

    let (first, created) = store.insert_if_absent(record("m1")).await.unwrap();
    assert!(created);
    assert_eq!(first.queue_status, QueueStatus::Untried);

    let (second, created) = store.insert_if_absent(record("m1")).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, "m1");
    assert_eq!(second.envelope.notification_type, first.envelope.notification_type);
    assert_eq!(second.envelope.object_types(), ["sorg:Review".to_string()]);
    assert_eq!(store.count_by_status().await.unwrap().total(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_compare_and_set_rejects_stale_writer(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let (stored, _) = store.insert_if_absent(record("m1")).await.unwrap();
    let expected = ExpectedState::of(&stored);

    let mut update = RecordUpdate::from_record(&stored, Utc::now());
    update.queue_status = QueueStatus::QueuedForRetry;
    update.attempts = 1;
    update.last_error = Some("busy".to_string());
    update.next_retry_at = Some(Utc::now());
    let updated = store.compare_and_set("m1", expected, update.clone()).await.unwrap();
    assert_eq!(updated.queue_status, QueueStatus::QueuedForRetry);
    assert_eq!(updated.attempts, 1);

    let stale = store.compare_and_set("m1", expected, update.clone()).await;
    assert!(matches!(stale, Err(StoreError::ConcurrentModification { .. })));

    let missing = store.compare_and_set("nope", expected, update).await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_find_due_orders_by_due_time(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let now = Utc::now();

    for (id, offset_secs) in [("late", 30), ("early", -60), ("future", 3_600)] {
        let (stored, _) = store.insert_if_absent(record(id)).await.unwrap();
        let mut update = RecordUpdate::from_record(&stored, now);
        update.queue_status = QueueStatus::QueuedForRetry;
        update.attempts = 1;
        update.next_retry_at = Some(now + ChronoDuration::seconds(offset_secs));
        store
            .compare_and_set(id, ExpectedState::of(&stored), update)
            .await
            .unwrap();
    }

    let due = store
        .find_due(QueueStatus::QueuedForRetry, now + ChronoDuration::minutes(1), 10)
        .await
        .unwrap();
    let ids: Vec<&str> = due.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);

    let limited = store
        .find_due(QueueStatus::QueuedForRetry, now + ChronoDuration::days(1), 1)
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts.queued_for_retry, 3);
    assert_eq!(
        store
            .list_by_status(QueueStatus::QueuedForRetry, 10)
            .await
            .unwrap()
            .len(),
        3
    );
}
