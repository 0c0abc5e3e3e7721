//! Integration tests for `PgEventRepository`.
//!
//! Run with `DATABASE_URL` pointing at a disposable database and
//! `cargo test -- --ignored`.

use conductor_core::error::DomainError;
use conductor_core::repository::{EventRepository, StoredEvent, StreamId};
use conductor_event_store::pg_event_repository::PgEventRepository;
use conductor_test_support::stored_event;
use sqlx::PgPool;
use uuid::Uuid;

fn make_stored_event(aggregate_id: &str, sequence_number: i64) -> StoredEvent {
    let mut event = stored_event(
        "order",
        aggregate_id,
        sequence_number,
        "order.placed",
        serde_json::json!({ "order_id": aggregate_id }),
    );
    event.causation_id = Some(Uuid::new_v4());
    event.command_fingerprint = Some("ab".repeat(32));
    event
}

// --- load_events ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_load_events_returns_empty_vec_for_nonexistent_stream(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let events = repo.load_events(&StreamId::new("order", "O404")).await.unwrap();

    assert!(events.is_empty());
}

// --- append_events + load_events round-trip ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_append_and_load_single_event(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let stream = StreamId::new("order", "O1");
    let event = make_stored_event("O1", 1);

    repo.append_events(&stream, 0, std::slice::from_ref(&event))
        .await
        .unwrap();

    let loaded = repo.load_events(&stream).await.unwrap();
    assert_eq!(loaded, vec![event]);
}

// --- ordering ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_append_multiple_events_preserves_sequence_order(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let stream = StreamId::new("order", "O1");

    repo.append_events(&stream, 0, &[make_stored_event("O1", 1), make_stored_event("O1", 2)])
        .await
        .unwrap();
    repo.append_events(&stream, 2, &[make_stored_event("O1", 3)])
        .await
        .unwrap();

    let loaded = repo.load_events(&stream).await.unwrap();
    let versions: Vec<_> = loaded.iter().map(|e| e.sequence_number).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_append_with_stale_version_returns_concurrency_conflict(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let stream = StreamId::new("order", "O1");
    repo.append_events(&stream, 0, &[make_stored_event("O1", 1)])
        .await
        .unwrap();

    let result = repo
        .append_events(&stream, 0, &[make_stored_event("O1", 1)])
        .await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 0,
            actual: 1,
            ..
        })
    ));
}

// --- stream isolation ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_streams_are_isolated_by_type_and_id(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    repo.append_events(&StreamId::new("order", "O1"), 0, &[make_stored_event("O1", 1)])
        .await
        .unwrap();

    let other_id = repo.load_events(&StreamId::new("order", "O2")).await.unwrap();
    let other_type = repo.load_events(&StreamId::new("payment", "O1")).await.unwrap();

    assert!(other_id.is_empty());
    assert!(other_type.is_empty());
}
