//! Progress Sessions
//!
//! Couples one user's engine with a store. Engine actions run under a mutex
//! and apply in memory immediately; saving happens afterwards on a single
//! writer task that always writes the newest queued snapshot, so a slow save
//! can never land after a newer one. A failed save is logged and never rolls
//! the in-memory state back.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::curriculum::SubjectId;
use crate::engine::{CompletionReport, Mode, ProgressState, ProgressionEngine};
use crate::errors::{EngineError, LevelupError, StoreError};
use crate::snapshot::{RestoreReport, Snapshot};
use crate::store::ProgressStore;
use crate::telemetry::sanitize_for_log;
use crate::xp::LevelChange;

/// Latest-wins queue feeding the background writer
struct SaveQueue {
    next_seq: AtomicU64,
    pending: watch::Sender<Option<(u64, Snapshot)>>,
    written: watch::Receiver<u64>,
}

impl SaveQueue {
    fn spawn(store: Arc<dyn ProgressStore>, user_id: String) -> Self {
        let (pending, pending_rx) = watch::channel(None);
        let (written_tx, written) = watch::channel(0);
        tokio::spawn(write_latest(store, user_id, pending_rx, written_tx));
        Self {
            next_seq: AtomicU64::new(0),
            pending,
            written,
        }
    }
}

/// Writer loop: saves one snapshot at a time, skipping any superseded while
/// a save was in flight. Exits once the session is dropped.
async fn write_latest(
    store: Arc<dyn ProgressStore>,
    user_id: String,
    mut pending: watch::Receiver<Option<(u64, Snapshot)>>,
    written: watch::Sender<u64>,
) {
    while pending.changed().await.is_ok() {
        let next = pending.borrow_and_update().clone();
        let Some((seq, snapshot)) = next else {
            continue;
        };
        if let Err(e) = store.save(&user_id, &snapshot).await {
            warn!(
                user = %sanitize_for_log(&user_id),
                error = %e,
                "Failed to save progress; in-memory state kept"
            );
        }
        written.send_replace(seq);
    }
}

/// A user's engine plus the store it persists to
#[derive(Clone)]
pub struct ProgressSession {
    user_id: String,
    engine: Arc<Mutex<ProgressionEngine>>,
    store: Arc<dyn ProgressStore>,
    saver: Option<Arc<SaveQueue>>,
}

impl ProgressSession {
    /// Load `user_id`'s saved progress into `engine`.
    ///
    /// A user with nothing saved starts from the catalog defaults, with the
    /// username set to the user id. Load failures are returned to the caller.
    pub async fn open(
        user_id: impl Into<String>,
        mut engine: ProgressionEngine,
        store: Arc<dyn ProgressStore>,
    ) -> Result<(Self, RestoreReport), LevelupError> {
        let user_id = user_id.into();
        let snapshot = store.load(&user_id).await?;
        let report = engine.restore(snapshot.as_ref())?;
        if engine.state().username().is_empty() {
            engine.set_username(user_id.clone());
        }
        debug!(
            user = %sanitize_for_log(&user_id),
            defaults = report.used_defaults,
            "Session opened"
        );

        let saver = SaveQueue::spawn(Arc::clone(&store), user_id.clone());
        let session = Self {
            user_id,
            engine: Arc::new(Mutex::new(engine)),
            store,
            saver: Some(Arc::new(saver)),
        };
        Ok((session, report))
    }

    /// Stop background saves after each action; the caller persists with
    /// [`persist`](Self::persist) instead.
    pub fn without_autosave(mut self) -> Self {
        self.saver = None;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Read the current state under the lock
    pub fn read<R>(&self, f: impl FnOnce(&ProgressState) -> R) -> R {
        f(self.engine.lock().state())
    }

    /// Run an arbitrary query against the engine
    pub fn with_engine<R>(&self, f: impl FnOnce(&ProgressionEngine) -> R) -> R {
        f(&self.engine.lock())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.lock().snapshot()
    }

    // ------------------------------------------------------------------------
    // Actions (apply now, save in background)
    // ------------------------------------------------------------------------

    pub fn complete_topic(&self, subject: SubjectId, topic_id: &str, score: u32) -> CompletionReport {
        let report = self.engine.lock().complete_topic(subject, topic_id, score);
        if !report.is_noop() {
            self.persist_in_background();
        }
        report
    }

    /// Strict completion: unknown ids are errors and nothing is saved
    pub fn try_complete_topic(
        &self,
        subject: SubjectId,
        topic_id: &str,
        score: u32,
    ) -> Result<CompletionReport, EngineError> {
        let report = self
            .engine
            .lock()
            .try_complete_topic(subject, topic_id, score)?;
        self.persist_in_background();
        Ok(report)
    }

    pub fn add_xp(&self, amount: u64) -> LevelChange {
        let change = self.engine.lock().add_xp(amount);
        self.persist_in_background();
        change
    }

    pub fn set_username(&self, name: impl Into<String>) {
        self.engine.lock().set_username(name);
        self.persist_in_background();
    }

    pub fn set_mode(&self, mode: Mode) {
        self.engine.lock().set_mode(mode);
        self.persist_in_background();
    }

    pub fn unlock_project_level(&self, project_id: &str, level_id: &str) -> bool {
        let unlocked = self.engine.lock().unlock_project_level(project_id, level_id);
        if unlocked {
            self.persist_in_background();
        }
        unlocked
    }

    pub fn complete_project_level(
        &self,
        project_id: &str,
        level_id: &str,
    ) -> Result<LevelChange, EngineError> {
        let change = self
            .engine
            .lock()
            .complete_project_level(project_id, level_id)?;
        self.persist_in_background();
        Ok(change)
    }

    pub fn reset(&self) {
        self.engine.lock().reset();
        self.persist_in_background();
    }

    /// Replace progress with an imported snapshot; `None` resets to defaults
    pub fn import(&self, snapshot: Option<&Snapshot>) -> Result<RestoreReport, LevelupError> {
        let report = self.engine.lock().restore(snapshot)?;
        self.persist_in_background();
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Save the current state and wait for the result. Not ordered against
    /// background saves; use on sessions opened [`without_autosave`](Self::without_autosave).
    pub async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.snapshot();
        self.store.save(&self.user_id, &snapshot).await
    }

    /// Queue the current state for the background writer. Errors are only
    /// logged. No-op without autosave.
    pub fn persist_in_background(&self) {
        let Some(saver) = &self.saver else {
            return;
        };
        // Snapshot and sequence number are taken under the engine lock so
        // queue order matches state order.
        let engine = self.engine.lock();
        let seq = saver.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = engine.snapshot();
        saver.pending.send_if_modified(|slot| {
            let newer = slot.as_ref().is_none_or(|(queued, _)| *queued < seq);
            if newer {
                *slot = Some((seq, snapshot));
            }
            newer
        });
    }

    /// Wait until every queued background save has been attempted
    pub async fn flush(&self) {
        let Some(saver) = &self.saver else {
            return;
        };
        let target = saver.next_seq.load(Ordering::SeqCst);
        let mut written = saver.written.clone();
        let _ = written.wait_for(|seq| *seq >= target).await;
    }
}

impl std::fmt::Debug for ProgressSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSession")
            .field("user_id", &self.user_id)
            .field("autosave", &self.saver.is_some())
            .finish_non_exhaustive()
    }
}
