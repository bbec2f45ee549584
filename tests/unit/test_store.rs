//! Progress stores
//!
//! Tests cover:
//! - File store persistence across instances
//! - Listing and deletion
//! - The in-memory store

use levelup::engine::ProgressionEngine;
use levelup::errors::StoreError;
use levelup::store::{FileProgressStore, MemoryProgressStore, ProgressStore};
use levelup::SubjectId;
use tempfile::tempdir;

fn snapshot_with_xp(topics: &[(SubjectId, &str)]) -> levelup::Snapshot {
    let mut engine = ProgressionEngine::default();
    for (subject, topic) in topics {
        engine.complete_topic(*subject, topic, 100);
    }
    engine.snapshot()
}

#[tokio::test]
async fn test_file_store_survives_new_instance() {
    let dir = tempdir().unwrap();
    let snapshot = snapshot_with_xp(&[(SubjectId::Dbms, "dbms-er")]);

    FileProgressStore::new(dir.path())
        .unwrap()
        .save("asha", &snapshot)
        .await
        .unwrap();

    let reopened = FileProgressStore::new(dir.path()).unwrap();
    let loaded = reopened.load("asha").await.unwrap().unwrap();
    assert_eq!(loaded.xp, Some(100));
    assert_eq!(loaded.completed_topic_count(), 1);
}

#[tokio::test]
async fn test_file_store_users_are_isolated() {
    let dir = tempdir().unwrap();
    let store = FileProgressStore::new(dir.path()).unwrap();
    store
        .save("asha", &snapshot_with_xp(&[(SubjectId::Os, "os-processes")]))
        .await
        .unwrap();

    assert!(store.load("ravi").await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_store_overwrite_keeps_latest() {
    let dir = tempdir().unwrap();
    let store = FileProgressStore::new(dir.path()).unwrap();
    store.save("asha", &snapshot_with_xp(&[])).await.unwrap();
    store
        .save(
            "asha",
            &snapshot_with_xp(&[(SubjectId::Os, "os-processes"), (SubjectId::Os, "os-scheduling")]),
        )
        .await
        .unwrap();

    let loaded = store.load("asha").await.unwrap().unwrap();
    assert_eq!(loaded.xp, Some(200));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_store_list_summaries() {
    let dir = tempdir().unwrap();
    let store = FileProgressStore::new(dir.path()).unwrap();
    store
        .save("asha", &snapshot_with_xp(&[(SubjectId::Dbms, "dbms-er")]))
        .await
        .unwrap();
    store.save("ravi", &snapshot_with_xp(&[])).await.unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not progress").unwrap();

    let mut users: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.user_id, s.xp, s.completed_topics))
        .collect();
    users.sort();
    assert_eq!(
        users,
        vec![("asha".to_string(), 100, 1), ("ravi".to_string(), 0, 0)]
    );
}

#[tokio::test]
async fn test_file_store_delete_missing_user_is_ok() {
    let dir = tempdir().unwrap();
    let store = FileProgressStore::new(dir.path()).unwrap();
    store.delete("nobody").await.unwrap();
}

#[tokio::test]
async fn test_blank_user_is_rejected() {
    let store = MemoryProgressStore::new();
    let err = store.load("  ").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidUser(_)));
}

#[tokio::test]
async fn test_memory_store_accepts_legacy_blob() {
    let store = MemoryProgressStore::new();
    store.insert_raw("asha", r#"{ "xp": 300, "username": "Asha" }"#);

    let loaded = store.load("asha").await.unwrap().unwrap();
    assert!(loaded.is_legacy());
    assert_eq!(loaded.xp, Some(300));
}

#[tokio::test]
async fn test_memory_store_rejects_future_version() {
    let store = MemoryProgressStore::new();
    store.insert_raw("asha", r#"{ "version": 7 }"#);

    let err = store.load("asha").await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}
