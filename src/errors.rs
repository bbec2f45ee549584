use std::path::PathBuf;
use thiserror::Error;

use crate::curriculum::SubjectId;

/// The central error type for levelup.
///
/// Each layer (catalog, snapshot, store, engine) has its own enum so callers
/// can match on the failure they care about; this type unifies them for the
/// CLI and other application code.
#[derive(Error, Debug)]
pub enum LevelupError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Subject {0} is defined more than once")]
    DuplicateSubject(SubjectId),

    #[error("Subject {0} has no topics")]
    EmptySubject(SubjectId),

    #[error("Topic '{topic_id}' is defined more than once (in {first} and {second})")]
    DuplicateTopic {
        topic_id: String,
        first: SubjectId,
        second: SubjectId,
    },

    #[error("Project '{0}' is defined more than once")]
    DuplicateProject(String),

    #[error("Level '{level_id}' is defined more than once in project '{project_id}'")]
    DuplicateLevel { project_id: String, level_id: String },

    #[error("Level '{level_id}' of project '{project_id}' requires unknown topic '{topic_id}'")]
    UnknownPrerequisite {
        project_id: String,
        level_id: String,
        topic_id: String,
    },

    #[error("Failed to read catalog from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse catalog: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored progress for '{user_id}' is corrupted: {message}")]
    Corrupt { user_id: String, message: String },

    #[error("Invalid user id: {0:?}")]
    InvalidUser(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown subject: {0}")]
    UnknownSubject(SubjectId),

    #[error("Unknown topic '{topic_id}' in subject {subject}")]
    UnknownTopic { subject: SubjectId, topic_id: String },

    #[error("Unknown level '{level_id}' in project '{project_id}'")]
    UnknownLevel { project_id: String, level_id: String },

    #[error("Level '{level_id}' in project '{project_id}' is still locked")]
    LevelLocked { project_id: String, level_id: String },
}

pub type Result<T> = std::result::Result<T, LevelupError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_SNAPSHOT_ERROR: u8 = 4;
pub const EXIT_ENGINE_ERROR: u8 = 5;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<LevelupError>() {
        return match err {
            LevelupError::Config(_) | LevelupError::Catalog(_) => EXIT_CONFIG_ERROR,
            LevelupError::Store(_) => EXIT_STORE_ERROR,
            LevelupError::Snapshot(_) => EXIT_SNAPSHOT_ERROR,
            LevelupError::Engine(_) => EXIT_ENGINE_ERROR,
            LevelupError::Other(_) => EXIT_ERROR,
        };
    }

    // Layer errors returned straight into anyhow
    if e.downcast_ref::<CatalogError>().is_some() {
        return EXIT_CONFIG_ERROR;
    }
    if e.downcast_ref::<StoreError>().is_some() {
        return EXIT_STORE_ERROR;
    }
    if e.downcast_ref::<SnapshotError>().is_some() {
        return EXIT_SNAPSHOT_ERROR;
    }
    if e.downcast_ref::<EngineError>().is_some() {
        return EXIT_ENGINE_ERROR;
    }

    EXIT_ERROR
}
