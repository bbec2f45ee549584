//! Sessions over stores
//!
//! Tests cover:
//! - Optimistic apply with background saves
//! - Failed saves keep the in-memory state
//! - Reopening restores progress

use async_trait::async_trait;
use levelup::engine::{LevelRef, ProgressionEngine};
use levelup::errors::StoreError;
use levelup::session::ProgressSession;
use levelup::snapshot::Snapshot;
use levelup::store::{
    FileProgressStore, MemoryProgressStore, ProgressStore, StoredProgressSummary,
};
use levelup::xp::RewardPolicy;
use levelup::SubjectId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Loads nothing, refuses every save
#[derive(Default)]
struct FailingStore {
    save_attempts: AtomicUsize,
}

#[async_trait]
impl ProgressStore for FailingStore {
    async fn load(&self, _user_id: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(None)
    }

    async fn save(&self, user_id: &str, _snapshot: &Snapshot) -> Result<(), StoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Corrupt {
            user_id: user_id.to_string(),
            message: "disk full".to_string(),
        })
    }

    async fn delete(&self, _user_id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredProgressSummary>, StoreError> {
        Ok(Vec::new())
    }
}

/// Memory store whose first save stalls, so later saves could overtake it
#[derive(Default)]
struct SlowFirstSaveStore {
    inner: MemoryProgressStore,
    stalled: AtomicBool,
}

#[async_trait]
impl ProgressStore for SlowFirstSaveStore {
    async fn load(&self, user_id: &str) -> Result<Option<Snapshot>, StoreError> {
        self.inner.load(user_id).await
    }

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.inner.save(user_id, snapshot).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        self.inner.delete(user_id).await
    }

    async fn list(&self) -> Result<Vec<StoredProgressSummary>, StoreError> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_slow_save_never_overwrites_newer_progress() {
    let store = Arc::new(SlowFirstSaveStore::default());
    let (session, _) =
        ProgressSession::open("asha", ProgressionEngine::default(), store.clone())
            .await
            .unwrap();

    session.complete_topic(SubjectId::Os, "os-processes", 100);
    // Let the writer pick up the first snapshot and stall on it
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.complete_topic(SubjectId::Os, "os-scheduling", 100);
    session.flush().await;

    assert_eq!(session.read(|s| s.xp()), 200);
    let saved = store.load("asha").await.unwrap().unwrap();
    assert_eq!(saved.xp, Some(200));
    assert_eq!(saved.completed_topic_count(), 2);
}

#[tokio::test]
async fn test_import_null_resets_to_defaults() {
    let store = Arc::new(MemoryProgressStore::new());
    let (session, _) = ProgressSession::open("asha", ProgressionEngine::default(), store)
        .await
        .unwrap();
    let session = session.without_autosave();
    session.add_xp(300);

    let snapshot = Snapshot::from_json("null").unwrap();
    let report = session.import(snapshot.as_ref()).unwrap();
    assert!(report.used_defaults);
    assert!(!report.legacy);
    assert_eq!(session.read(|s| s.xp()), 0);
}

#[tokio::test]
async fn test_failed_save_keeps_state() {
    let store = Arc::new(FailingStore::default());
    let (session, _) =
        ProgressSession::open("asha", ProgressionEngine::default(), store.clone())
            .await
            .unwrap();

    let report = session.complete_topic(SubjectId::Dbms, "dbms-er", 100);
    session.flush().await;

    assert!(report.unlocked_levels.contains(&LevelRef::new("library-db", "schema")));
    assert_eq!(session.read(|s| s.xp()), 100);
    assert!(store.save_attempts.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_persist_reports_failure_to_caller() {
    let store = Arc::new(FailingStore::default());
    let (session, _) = ProgressSession::open("asha", ProgressionEngine::default(), store)
        .await
        .unwrap();
    let session = session.without_autosave();

    session.add_xp(50);
    assert!(session.persist().await.is_err());
    assert_eq!(session.read(|s| s.xp()), 50);
}

#[tokio::test]
async fn test_without_autosave_defers_writes() {
    let store = Arc::new(MemoryProgressStore::new());
    let (session, _) =
        ProgressSession::open("asha", ProgressionEngine::default(), store.clone())
            .await
            .unwrap();
    let session = session.without_autosave();

    session.complete_topic(SubjectId::Os, "os-processes", 100);
    tokio::task::yield_now().await;
    assert!(store.is_empty());

    session.persist().await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_unknown_subject_is_not_saved() {
    let store = Arc::new(MemoryProgressStore::new());
    let mut small = levelup::Catalog::builtin();
    small.subjects.retain(|s| s.id != SubjectId::Aptitude);
    let engine = ProgressionEngine::new(small, RewardPolicy::default());

    let (session, _) = ProgressSession::open("asha", engine, store.clone())
        .await
        .unwrap();
    let report = session.complete_topic(SubjectId::Aptitude, "apt-ratios", 100);

    assert!(report.is_noop());
    assert_eq!(session.read(|s| s.xp()), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_file_backed_session_roundtrip() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(dir.path()).unwrap());

    let (session, report) =
        ProgressSession::open("asha", ProgressionEngine::default(), store.clone())
            .await
            .unwrap();
    assert!(report.used_defaults);
    let session = session.without_autosave();
    session.complete_topic(SubjectId::Dbms, "dbms-er", 100);
    session.unlock_project_level("placement-prep", "final");
    session.set_username("Asha K");
    session.persist().await.unwrap();

    let (reopened, report) = ProgressSession::open("asha", ProgressionEngine::default(), store)
        .await
        .unwrap();
    assert!(!report.used_defaults);
    assert_eq!(reopened.user_id(), "asha");
    assert_eq!(reopened.read(|s| s.username().to_string()), "Asha K");
    assert!(reopened
        .with_engine(|e| e.unlocked_levels())
        .contains(&LevelRef::new("placement-prep", "final")));
}

#[tokio::test]
async fn test_import_replaces_progress() {
    let store = Arc::new(MemoryProgressStore::new());
    let (session, _) = ProgressSession::open("asha", ProgressionEngine::default(), store)
        .await
        .unwrap();
    let session = session.without_autosave();
    session.complete_topic(SubjectId::Os, "os-processes", 100);

    let mut other = ProgressionEngine::default();
    other.complete_topic(SubjectId::Dbms, "dbms-er", 100);
    other.add_xp(400);

    let report = session.import(Some(&other.snapshot())).unwrap();
    assert_eq!(report.ignored, 0);
    assert_eq!(session.read(|s| s.xp()), 500);
    assert!(!session.with_engine(|e| e.completed_topic_ids().contains("os-processes")));
}
