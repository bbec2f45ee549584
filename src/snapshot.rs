//! Progress Snapshots
//!
//! Serialized subset of engine state exchanged with the persistence layer.
//! Snapshots carry a schema `version`; a blob without one is a legacy,
//! unversioned object written by the web client and is still accepted.
//! Derived values (level, level locks, subject progress) are never read
//! back from a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::{LevelRef, Mode};
use crate::errors::SnapshotError;

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Version reported for blobs that carry no version field
pub const LEGACY_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<u64>,
    #[serde(default)]
    pub subjects: Vec<SubjectSnapshot>,
    #[serde(default)]
    pub projects: Vec<ProjectSnapshot>,
    #[serde(default)]
    pub manual_unlocks: Vec<LevelRef>,
}

/// Subject id is kept as a string so unknown subjects are skipped on
/// restore instead of failing the whole blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSnapshot {
    pub id: String,
    #[serde(default)]
    pub topics: Vec<TopicSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSnapshot {
    pub id: String,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_unlocked: Option<bool>,
    #[serde(default)]
    pub levels: Vec<LevelSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSnapshot {
    pub id: String,
    #[serde(default)]
    pub is_completed: bool,
}

/// Unknown mode strings from older clients fall back to "not set"
fn lenient_mode<'de, D>(deserializer: D) -> Result<Option<Mode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok()))
}

impl Snapshot {
    /// Empty snapshot at the current schema version
    pub fn new() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            ..Default::default()
        }
    }

    /// Parse a stored blob. JSON `null` means "no prior progress".
    pub fn from_json(json: &str) -> Result<Option<Self>, SnapshotError> {
        let snapshot: Option<Snapshot> = serde_json::from_str(json)?;
        match snapshot {
            Some(s) => {
                s.check_version()?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    /// Parse from an already-decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Option<Self>, SnapshotError> {
        let snapshot: Option<Snapshot> = serde_json::from_value(value)?;
        if let Some(ref s) = snapshot {
            s.check_version()?;
        }
        Ok(snapshot)
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_legacy(&self) -> bool {
        self.version == LEGACY_VERSION
    }

    pub fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    pub fn completed_topic_count(&self) -> usize {
        self.subjects
            .iter()
            .flat_map(|s| &s.topics)
            .filter(|t| t.is_completed)
            .count()
    }
}

/// Outcome of merging a snapshot into catalog defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    /// No snapshot was given; state equals catalog defaults
    pub used_defaults: bool,
    /// The snapshot had no version field
    pub legacy: bool,
    pub topics_applied: usize,
    pub levels_applied: usize,
    /// Subjects, topics, projects, levels or overrides absent from the catalog
    pub ignored: usize,
}

impl RestoreReport {
    pub fn defaults() -> Self {
        Self {
            used_defaults: true,
            ..Default::default()
        }
    }
}
