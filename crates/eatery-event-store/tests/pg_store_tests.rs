//! Integration tests for the PostgreSQL stores.
//!
//! Run with `DATABASE_URL` pointing at a disposable database and
//! `cargo test -- --ignored`.

use chrono::{DurationRound, TimeDelta, Utc};
use eatery_core::error::DomainError;
use eatery_core::event_store::{EventRepository, StoredEvent};
use eatery_core::message::{InboxStore, Message, OutboxStore, SaveOutcome};
use eatery_core::snapshot::{SnapshotRecord, SnapshotRepository};
use eatery_event_store::pg_event_repository::PgEventRepository;
use eatery_event_store::pg_inbox_store::PgInboxStore;
use eatery_event_store::pg_outbox_store::PgOutboxStore;
use eatery_event_store::pg_snapshot_repository::PgSnapshotRepository;
use eatery_event_store::schema::Schema;
use eatery_event_store::transaction::PgTransactionManager;
use sqlx::PgPool;
use uuid::Uuid;

const SCHEMA: Schema = Schema::new("restaurants");
const STREAM: &str = "restaurants.Restaurant";

/// Helper to build a `StoredEvent` with sensible defaults.
fn make_stored_event(stream_id: Uuid, stream_version: i64) -> StoredEvent {
    StoredEvent {
        stream_id,
        stream_name: STREAM.to_owned(),
        stream_version,
        event_id: Uuid::new_v4(),
        event_name: "restaurants.RestaurantRegistered".to_owned(),
        event_data: br#"{"name":"Corner Bistro"}"#.to_vec(),
        // Postgres stores microseconds.
        occurred_at: Utc::now().duration_trunc(TimeDelta::microseconds(1)).unwrap(),
    }
}

fn make_message(id: &str) -> Message {
    Message::new(
        id,
        "restaurantsapi.RestaurantRegistered",
        "eatery.restaurants.events.Restaurant",
        br#"{"id":"x"}"#.to_vec(),
    )
    .with_metadata("content_type", "application/json")
}

// --- events ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_load_events_returns_empty_vec_for_unknown_stream(pool: PgPool) {
    let repo = PgEventRepository::new(pool, SCHEMA);

    let events = repo.load_events(Uuid::new_v4(), STREAM, 0).await.unwrap();

    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_append_then_load_preserves_rows_in_version_order(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool, SCHEMA);
    let stream_id = Uuid::new_v4();
    let events = vec![
        make_stored_event(stream_id, 1),
        make_stored_event(stream_id, 2),
        make_stored_event(stream_id, 3),
    ];

    // Act
    repo.append_events(&events).await.unwrap();
    let loaded = repo.load_events(stream_id, STREAM, 0).await.unwrap();

    // Assert
    assert_eq!(loaded, events);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_load_events_skips_versions_at_or_below_cursor(pool: PgPool) {
    let repo = PgEventRepository::new(pool, SCHEMA);
    let stream_id = Uuid::new_v4();
    repo.append_events(&[
        make_stored_event(stream_id, 1),
        make_stored_event(stream_id, 2),
        make_stored_event(stream_id, 3),
    ])
    .await
    .unwrap();

    let loaded = repo.load_events(stream_id, STREAM, 2).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].stream_version, 3);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_duplicate_version_is_conflict(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool, SCHEMA);
    let stream_id = Uuid::new_v4();
    repo.append_events(&[make_stored_event(stream_id, 1)])
        .await
        .unwrap();

    // Act
    let result = repo
        .append_events(&[make_stored_event(stream_id, 1)])
        .await;

    // Assert
    match result {
        Err(DomainError::Conflict { stream_id: id, version, .. }) => {
            assert_eq!(id, stream_id);
            assert_eq!(version, 1);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_reused_event_id_in_another_stream_is_not_conflict(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool, SCHEMA);
    let first = make_stored_event(Uuid::new_v4(), 1);
    repo.append_events(std::slice::from_ref(&first)).await.unwrap();
    let reused = StoredEvent {
        stream_id: Uuid::new_v4(),
        ..first.clone()
    };

    // Act
    let result = repo.append_events(&[reused]).await;

    // Assert
    assert!(matches!(result, Err(DomainError::Validation(_))));
    assert!(!result.unwrap_err().is_retryable());
}

// --- snapshots ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_snapshot_upsert_keeps_newest(pool: PgPool) {
    // Arrange
    let repo = PgSnapshotRepository::new(pool, SCHEMA);
    let stream_id = Uuid::new_v4();
    let record = |version: i64| SnapshotRecord {
        stream_id,
        stream_name: STREAM.to_owned(),
        stream_version: version,
        snapshot_name: "restaurants.RestaurantV1".to_owned(),
        snapshot_data: format!(r#"{{"name":"v{version}"}}"#).into_bytes(),
    };

    // Act
    repo.save(&record(3)).await.unwrap();
    repo.save(&record(6)).await.unwrap();
    repo.save(&record(3)).await.unwrap();

    // Assert
    let latest = repo.load_latest(stream_id, STREAM).await.unwrap().unwrap();
    assert_eq!(latest, record(6));
}

// --- outbox ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_outbox_duplicate_id_is_absorbed(pool: PgPool) {
    let outbox = PgOutboxStore::new(pool, SCHEMA);

    let first = outbox.save(&make_message("m-1")).await.unwrap();
    let second = outbox.save(&make_message("m-1")).await.unwrap();

    assert_eq!(first, SaveOutcome::Stored);
    assert_eq!(second, SaveOutcome::Duplicate);
    assert_eq!(outbox.find_unpublished(10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_outbox_drains_in_insertion_order_until_marked(pool: PgPool) {
    // Arrange
    let outbox = PgOutboxStore::new(pool, SCHEMA);
    for id in ["m-3", "m-1", "m-2"] {
        outbox.save(&make_message(id)).await.unwrap();
    }

    // Act
    let batch = outbox.find_unpublished(2).await.unwrap();
    outbox
        .mark_published(&["m-3".to_owned(), "m-1".to_owned()])
        .await
        .unwrap();
    outbox.mark_published(&["m-3".to_owned()]).await.unwrap();
    let rest = outbox.find_unpublished(10).await.unwrap();

    // Assert
    let ids: Vec<&str> = batch.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m-3", "m-1"]);
    assert_eq!(batch[0].metadata["content_type"], "application/json");
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, "m-2");
}

// --- inbox ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_inbox_redelivery_reports_duplicate(pool: PgPool) {
    let inbox = PgInboxStore::new(pool, SCHEMA);

    let first = inbox.save(&make_message("m-1")).await.unwrap();
    let second = inbox.save(&make_message("m-1")).await.unwrap();

    assert_eq!(first, SaveOutcome::Stored);
    assert_eq!(second, SaveOutcome::Duplicate);
}

// --- transactions ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_failed_unit_of_work_rolls_back_event_and_outbox_row(pool: PgPool) {
    // Arrange
    let manager = PgTransactionManager::new(pool.clone());
    let stream_id = Uuid::new_v4();

    let tx = manager.begin().await.unwrap();
    PgEventRepository::new(tx.clone(), SCHEMA)
        .append_events(&[make_stored_event(stream_id, 1)])
        .await
        .unwrap();
    PgOutboxStore::new(tx.clone(), SCHEMA)
        .save(&make_message("m-1"))
        .await
        .unwrap();

    // Act: the unit of work is abandoned before commit.
    drop(tx);

    // Assert
    let events = PgEventRepository::new(pool.clone(), SCHEMA)
        .load_events(stream_id, STREAM, 0)
        .await
        .unwrap();
    assert!(events.is_empty());
    let unsent = PgOutboxStore::new(pool, SCHEMA)
        .find_unpublished(10)
        .await
        .unwrap();
    assert!(unsent.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_committed_unit_of_work_persists_event_and_outbox_row(pool: PgPool) {
    let manager = PgTransactionManager::new(pool.clone());
    let stream_id = Uuid::new_v4();

    let tx = manager.begin().await.unwrap();
    PgEventRepository::new(tx.clone(), SCHEMA)
        .append_events(&[make_stored_event(stream_id, 1)])
        .await
        .unwrap();
    PgOutboxStore::new(tx.clone(), SCHEMA)
        .save(&make_message("m-1"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let events = PgEventRepository::new(pool.clone(), SCHEMA)
        .load_events(stream_id, STREAM, 0)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    let unsent = PgOutboxStore::new(pool, SCHEMA)
        .find_unpublished(10)
        .await
        .unwrap();
    assert_eq!(unsent.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_outbox_duplicate_inside_transaction_does_not_abort_it(pool: PgPool) {
    let manager = PgTransactionManager::new(pool.clone());

    let tx = manager.begin().await.unwrap();
    let outbox = PgOutboxStore::new(tx.clone(), SCHEMA);
    outbox.save(&make_message("m-1")).await.unwrap();
    let outcome = outbox.save(&make_message("m-1")).await.unwrap();
    outbox.save(&make_message("m-2")).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(outcome, SaveOutcome::Duplicate);

    let unsent = PgOutboxStore::new(pool, SCHEMA)
        .find_unpublished(10)
        .await
        .unwrap();
    assert_eq!(unsent.len(), 2);
}
