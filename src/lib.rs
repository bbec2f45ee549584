//! LevelUp - Curriculum Progression Engine
//!
//! Tracks a learner through sequential topics, cross-subject project levels
//! and an XP/level curve, and persists the result as versioned snapshots.
//!
//! - **Curriculum**: Subjects with ordered topics, projects with levels gated
//!   on topic completion
//! - **Engine**: Topic completion, unlock propagation, manual overrides, XP
//! - **Snapshots**: Versioned JSON, legacy blobs accepted, validated restore
//! - **Store**: One JSON file per user, written atomically
//! - **Session**: Apply in memory now, save in the background
//!
//! # Quick Start
//!
//! ```
//! use levelup::{ProgressionEngine, SubjectId};
//!
//! let mut engine = ProgressionEngine::default();
//! let report = engine.complete_topic(SubjectId::Dbms, "dbms-er", 90);
//! assert_eq!(report.unlocked_topic.as_deref(), Some("dbms-relational"));
//! assert_eq!(engine.xp(), 100);
//! assert_eq!(engine.level(), 2);
//! ```

pub mod cli;
pub mod config;
pub mod curriculum;
pub mod engine;
pub mod errors;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod xp;

pub use config::Config;
pub use curriculum::{Catalog, Project, ProjectLevel, Subject, SubjectId, Topic, TopicState};
pub use engine::{CompletionReport, LevelRef, Mode, ProgressState, ProgressionEngine};
pub use errors::{LevelupError, Result};
pub use session::ProgressSession;
pub use snapshot::{RestoreReport, Snapshot, SNAPSHOT_VERSION};
pub use store::{FileProgressStore, MemoryProgressStore, ProgressStore};
pub use xp::{level_for_xp, LevelChange, ReplayPolicy, RewardPolicy};
