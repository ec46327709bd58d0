//! Call History Repository Integration Tests

#![cfg(feature = "postgres")]

use pitchlink::domain::history::{
    CallHistoryRecord, CallHistoryRecorder, CallHistoryRepository, CallStatus, HistoryError,
};
use pitchlink::domain::shared::value_objects::{HistoryRecordId, ParticipantId};
use pitchlink::infrastructure::persistence::{create_pool, run_migrations, DatabaseConfig, PgCallHistoryRepository};
use sqlx::PgPool;
use std::sync::Arc;

#[tokio::test]
#[ignore] // Requires database
async fn test_history_insert_and_get() {
    let pool = setup_database().await;
    let repo = PgCallHistoryRepository::new(pool.clone());

    let record = CallHistoryRecord::new(
        ParticipantId::new("test-alice"),
        ParticipantId::new("test-bob"),
    );
    repo.insert(&record).await.expect("Failed to insert record");

    let retrieved = repo
        .get(record.id)
        .await
        .expect("Failed to get record")
        .expect("Record not found");

    assert_eq!(retrieved.caller_id, ParticipantId::new("test-alice"));
    assert_eq!(retrieved.receiver_id, ParticipantId::new("test-bob"));
    assert_eq!(retrieved.status, CallStatus::Pending);
    assert!(retrieved.end_time.is_none());

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_history_get_missing() {
    let pool = setup_database().await;
    let repo = PgCallHistoryRepository::new(pool.clone());

    let retrieved = repo.get(HistoryRecordId::new()).await.expect("Failed to query");
    assert!(retrieved.is_none());

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_history_update() {
    let pool = setup_database().await;
    let repo = PgCallHistoryRepository::new(pool.clone());

    let mut record = CallHistoryRecord::new(
        ParticipantId::new("test-alice"),
        ParticipantId::new("test-carol"),
    );
    repo.insert(&record).await.expect("Failed to insert record");

    record.finalize(CallStatus::Missed).unwrap();
    assert!(repo.update(&record).await.expect("Failed to update record"));

    let retrieved = repo.get(record.id).await.unwrap().unwrap();
    assert_eq!(retrieved.status, CallStatus::Missed);
    assert!(retrieved.end_time.is_some());
    assert!(retrieved.duration_seconds().unwrap() >= 0);

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_history_update_missing_record() {
    let pool = setup_database().await;
    let repo = PgCallHistoryRepository::new(pool.clone());

    let record = CallHistoryRecord::new(
        ParticipantId::new("test-alice"),
        ParticipantId::new("test-bob"),
    );
    let result = repo.update(&record).await;
    assert!(matches!(result, Err(HistoryError::NotFound(id)) if id == record.id));

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_history_list_for_participant() {
    let pool = setup_database().await;
    let repo = PgCallHistoryRepository::new(pool.clone());

    for (caller, receiver) in [
        ("test-dave", "test-erin"),
        ("test-erin", "test-dave"),
        ("test-frank", "test-erin"),
    ] {
        let record = CallHistoryRecord::new(ParticipantId::new(caller), ParticipantId::new(receiver));
        repo.insert(&record).await.expect("Failed to insert record");
    }

    let dave = repo
        .list_for_participant(&ParticipantId::new("test-dave"), 50)
        .await
        .expect("Failed to list records");
    assert_eq!(dave.len(), 2);
    assert!(dave[0].start_time >= dave[1].start_time);

    let erin = repo
        .list_for_participant(&ParticipantId::new("test-erin"), 2)
        .await
        .expect("Failed to list records");
    assert_eq!(erin.len(), 2);

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_recorder_finalizes_once() {
    let pool = setup_database().await;
    let recorder = CallHistoryRecorder::new(Arc::new(PgCallHistoryRepository::new(pool.clone())));

    let id = recorder
        .start(&ParticipantId::new("test-alice"), &ParticipantId::new("test-bob"))
        .await
        .expect("Failed to start record");

    assert!(recorder.finish(id, CallStatus::Completed).await.unwrap());
    assert!(!recorder.finish(id, CallStatus::Failed).await.unwrap());

    let repo = PgCallHistoryRepository::new(pool.clone());
    let retrieved = repo.get(id).await.unwrap().unwrap();
    assert_eq!(retrieved.status, CallStatus::Completed);

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_history_update_skips_finalized_record() {
    let pool = setup_database().await;
    let repo = PgCallHistoryRepository::new(pool.clone());

    let pending = CallHistoryRecord::new(
        ParticipantId::new("test-alice"),
        ParticipantId::new("test-bob"),
    );
    repo.insert(&pending).await.expect("Failed to insert record");

    let mut completed = pending.clone();
    completed.finalize(CallStatus::Completed).unwrap();
    let mut failed = pending.clone();
    failed.finalize(CallStatus::Failed).unwrap();

    assert!(repo.update(&completed).await.unwrap());
    assert!(!repo.update(&failed).await.unwrap());

    let retrieved = repo.get(pending.id).await.unwrap().unwrap();
    assert_eq!(retrieved.status, CallStatus::Completed);

    cleanup_database(pool).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_recorder_concurrent_finish_writes_once() {
    let pool = setup_database().await;
    let recorder = CallHistoryRecorder::new(Arc::new(PgCallHistoryRepository::new(pool.clone())));

    let id = recorder
        .start(&ParticipantId::new("test-alice"), &ParticipantId::new("test-bob"))
        .await
        .expect("Failed to start record");

    let (first, second) = tokio::join!(
        recorder.finish(id, CallStatus::Completed),
        recorder.finish(id, CallStatus::Failed)
    );
    let applied = [first.unwrap(), second.unwrap()];
    assert_eq!(applied.iter().filter(|applied| **applied).count(), 1);

    cleanup_database(pool).await;
}

// Helper functions

async fn setup_database() -> PgPool {
    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/pitchlink_test".to_string());

    let config = DatabaseConfig {
        url: db_url,
        max_connections: 5,
        min_connections: 1,
        connect_timeout: std::time::Duration::from_secs(10),
        idle_timeout: std::time::Duration::from_secs(60),
        max_lifetime: std::time::Duration::from_secs(300),
    };

    let pool = create_pool(&config).await.expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

async fn cleanup_database(pool: PgPool) {
    // Clean up test data
    sqlx::query("DELETE FROM call_history WHERE caller_id LIKE 'test-%'")
        .execute(&pool)
        .await
        .ok();
    pool.close().await;
}
