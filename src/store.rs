//! Progress Persistence
//!
//! Load/save snapshots keyed by user identity. The engine never talks to a
//! store directly; [`crate::session::ProgressSession`] does.
//!
//! `FileProgressStore` keeps one pretty-printed JSON document per user. File
//! names are the SHA-256 of the user id, so any id maps to a safe path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::errors::StoreError;
use crate::snapshot::Snapshot;

/// Storage backend for user snapshots
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Previously saved snapshot, or `None` for a first-time user
    async fn load(&self, user_id: &str) -> Result<Option<Snapshot>, StoreError>;

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Remove a user's snapshot. Missing entries are not an error.
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;

    /// Saved users, most recent first
    async fn list(&self) -> Result<Vec<StoredProgressSummary>, StoreError>;
}

/// On-disk document for one user
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredProgress {
    user_id: String,
    saved_at: DateTime<Utc>,
    snapshot: Snapshot,
}

/// Summary info for listing saved users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProgressSummary {
    pub user_id: String,
    pub saved_at: DateTime<Utc>,
    pub xp: u64,
    pub completed_topics: usize,
}

impl StoredProgress {
    fn summary(&self) -> StoredProgressSummary {
        StoredProgressSummary {
            user_id: self.user_id.clone(),
            saved_at: self.saved_at,
            xp: self.snapshot.xp.unwrap_or(0),
            completed_topics: self.snapshot.completed_topic_count(),
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn check_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.trim().is_empty() {
        return Err(StoreError::InvalidUser(user_id.to_string()));
    }
    Ok(())
}

// ============================================================================
// File store
// ============================================================================

/// Snapshot store backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Open a store, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        let digest = Sha256::digest(user_id.as_bytes());
        self.dir
            .join(format!("progress-{}.json", hex::encode(digest)))
    }

    async fn read_document(&self, path: &Path) -> Result<Option<StoredProgress>, StoreError> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let doc: StoredProgress =
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                user_id: path.display().to_string(),
                message: e.to_string(),
            })?;
        doc.snapshot
            .check_version()
            .map_err(|e| StoreError::Corrupt {
                user_id: doc.user_id.clone(),
                message: e.to_string(),
            })?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self, user_id: &str) -> Result<Option<Snapshot>, StoreError> {
        check_user_id(user_id)?;
        let path = self.user_path(user_id);
        Ok(self.read_document(&path).await?.map(|doc| doc.snapshot))
    }

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        check_user_id(user_id)?;
        let path = self.user_path(user_id);
        let doc = StoredProgress {
            user_id: user_id.to_string(),
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        };
        let json = serde_json::to_string_pretty(&doc).map_err(|e| StoreError::Corrupt {
            user_id: user_id.to_string(),
            message: e.to_string(),
        })?;

        // Unique sibling temp file, then rename: readers never see a torn
        // file and concurrent saves never share a temp path
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Progress saved");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        check_user_id(user_id)?;
        let path = self.user_path(user_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn list(&self) -> Result<Vec<StoredProgressSummary>, StoreError> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            // Unreadable files are skipped rather than failing the listing
            if let Ok(Some(doc)) = self.read_document(&path).await {
                summaries.push(doc.summary());
            }
        }

        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Snapshot store held in process memory. Snapshots are kept as JSON text,
/// the same opaque blob a remote store would hold.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, (DateTime<Utc>, String)>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Raw stored blob for a user
    pub fn raw(&self, user_id: &str) -> Option<String> {
        self.entries.lock().get(user_id).map(|(_, json)| json.clone())
    }

    /// Seed a raw blob, e.g. one written by an older client
    pub fn insert_raw(&self, user_id: impl Into<String>, json: impl Into<String>) {
        self.entries
            .lock()
            .insert(user_id.into(), (Utc::now(), json.into()));
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, user_id: &str) -> Result<Option<Snapshot>, StoreError> {
        check_user_id(user_id)?;
        let Some(json) = self.raw(user_id) else {
            return Ok(None);
        };
        Snapshot::from_json(&json).map_err(|e| StoreError::Corrupt {
            user_id: user_id.to_string(),
            message: e.to_string(),
        })
    }

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        check_user_id(user_id)?;
        let json = serde_json::to_string(snapshot).map_err(|e| StoreError::Corrupt {
            user_id: user_id.to_string(),
            message: e.to_string(),
        })?;
        self.insert_raw(user_id, json);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        check_user_id(user_id)?;
        self.entries.lock().remove(user_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredProgressSummary>, StoreError> {
        let entries = self.entries.lock();
        let mut summaries: Vec<_> = entries
            .iter()
            .filter_map(|(user_id, (saved_at, json))| {
                let snapshot = Snapshot::from_json(json).ok().flatten()?;
                Some(StoredProgressSummary {
                    user_id: user_id.clone(),
                    saved_at: *saved_at,
                    xp: snapshot.xp.unwrap_or(0),
                    completed_topics: snapshot.completed_topic_count(),
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }
}
