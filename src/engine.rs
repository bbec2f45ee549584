//! Progression Engine
//!
//! Owns the learner's progress and applies every transition to it:
//! - Topic completion unlocks the next topic of the same subject
//! - Project level locks are re-derived from the global completed set after
//!   every completion
//! - XP accrues per completion; level is always derived from XP
//!
//! Actions never panic and never fail on unknown ids: an unknown subject is a
//! no-op, an unknown topic skips the completion but still awards XP. The
//! `try_` variants report unknown ids as errors instead.
//!
//! The engine is single-writer. Hosts with more than one thread should go
//! through [`crate::session::ProgressSession`], which serializes access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::curriculum::{completed_topic_ids_in, Catalog, Project, Subject, SubjectId, Topic};
use crate::errors::{CatalogError, EngineError, SnapshotError};
use crate::snapshot::{
    LevelSnapshot, ProjectSnapshot, RestoreReport, Snapshot, SubjectSnapshot, TopicSnapshot,
    SNAPSHOT_VERSION,
};
use crate::telemetry::sanitize_for_log;
use crate::xp::{level_for_xp, LevelChange, RewardPolicy};

// ============================================================================
// State
// ============================================================================

/// Which side of the app the learner is in
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Working through subject topics
    #[default]
    Learn,
    /// Working on project levels
    Build,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Learn => write!(f, "learn"),
            Mode::Build => write!(f, "build"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learn" | "learning" | "topics" => Ok(Mode::Learn),
            "build" | "building" | "project" | "projects" => Ok(Mode::Build),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Reference to one level of one project
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRef {
    pub project_id: String,
    pub level_id: String,
}

impl LevelRef {
    pub fn new(project_id: impl Into<String>, level_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            level_id: level_id.into(),
        }
    }
}

impl fmt::Display for LevelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.level_id)
    }
}

/// Learner progress. Read-only outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    username: String,
    mode: Mode,
    xp: u64,
    catalog: Catalog,
    manual_unlocks: BTreeSet<LevelRef>,
}

impl ProgressState {
    fn seeded(catalog: Catalog) -> Self {
        Self {
            username: String::new(),
            mode: Mode::default(),
            xp: 0,
            catalog,
            manual_unlocks: BTreeSet::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn xp(&self) -> u64 {
        self.xp
    }

    /// Derived from XP on every read
    pub fn level(&self) -> u32 {
        level_for_xp(self.xp)
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.catalog.subjects
    }

    pub fn projects(&self) -> &[Project] {
        &self.catalog.projects
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn manual_unlocks(&self) -> &BTreeSet<LevelRef> {
        &self.manual_unlocks
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Everything one `complete_topic` call changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub subject: SubjectId,
    pub topic_id: String,
    /// Informational only; never gates completion
    pub score: u32,
    pub subject_found: bool,
    pub topic_found: bool,
    /// False when the topic was already completed before this call
    pub first_completion: bool,
    /// Next topic in the subject, if this call unlocked it
    pub unlocked_topic: Option<String>,
    pub unlocked_levels: Vec<LevelRef>,
    pub locked_levels: Vec<LevelRef>,
    pub xp: LevelChange,
}

impl CompletionReport {
    fn new(subject: SubjectId, topic_id: &str, score: u32, xp_total: u64) -> Self {
        Self {
            subject,
            topic_id: topic_id.to_string(),
            score,
            subject_found: false,
            topic_found: false,
            first_completion: false,
            unlocked_topic: None,
            unlocked_levels: Vec::new(),
            locked_levels: Vec::new(),
            xp: LevelChange::none(xp_total),
        }
    }

    /// True when nothing at all changed (unknown subject)
    pub fn is_noop(&self) -> bool {
        !self.subject_found
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    state: ProgressState,
    defaults: Catalog,
    rewards: RewardPolicy,
}

impl Default for ProgressionEngine {
    fn default() -> Self {
        Self::new(Catalog::builtin(), RewardPolicy::default())
    }
}

impl ProgressionEngine {
    /// Create an engine seeded from `catalog`, which is normalized first.
    ///
    /// The catalog is not validated here. Catalogs from [`Catalog::load`]
    /// and [`Catalog::builtin`] already are; use [`try_new`](Self::try_new)
    /// for catalogs built in code.
    pub fn new(mut catalog: Catalog, rewards: RewardPolicy) -> Self {
        catalog.normalize();
        Self {
            state: ProgressState::seeded(catalog.clone()),
            defaults: catalog,
            rewards,
        }
    }

    /// Validate `catalog`, then create the engine
    pub fn try_new(catalog: Catalog, rewards: RewardPolicy) -> Result<Self, CatalogError> {
        catalog.validate()?;
        Ok(Self::new(catalog, rewards))
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn rewards(&self) -> RewardPolicy {
        self.rewards
    }

    /// Seeded catalog the engine resets to
    pub fn defaults(&self) -> &Catalog {
        &self.defaults
    }

    pub fn xp(&self) -> u64 {
        self.state.xp
    }

    pub fn level(&self) -> u32 {
        self.state.level()
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Mark a topic completed, unlock its successor, re-derive project level
    /// locks and award XP.
    pub fn complete_topic(
        &mut self,
        subject_id: SubjectId,
        topic_id: &str,
        score: u32,
    ) -> CompletionReport {
        let mut report = CompletionReport::new(subject_id, topic_id, score, self.state.xp);

        let Some(subject) = self.state.catalog.subject_mut(subject_id) else {
            warn!(
                subject = %subject_id,
                topic = %sanitize_for_log(topic_id),
                "Ignoring completion for unknown subject"
            );
            return report;
        };
        report.subject_found = true;

        match subject.topic_index(topic_id) {
            Some(index) => {
                report.topic_found = true;
                let topic = &mut subject.topics[index];
                report.first_completion = !topic.is_completed;
                topic.is_completed = true;

                if let Some(next) = subject.topics.get_mut(index + 1) {
                    if !next.is_unlocked {
                        next.is_unlocked = true;
                        report.unlocked_topic = Some(next.id.clone());
                    }
                }
                subject.recompute_progress();

                debug!(
                    subject = %subject_id,
                    topic = topic_id,
                    score,
                    first = report.first_completion,
                    progress = subject.progress,
                    "Topic completed"
                );
            }
            None => {
                warn!(
                    subject = %subject_id,
                    topic = %sanitize_for_log(topic_id),
                    "Unknown topic; XP is still awarded"
                );
            }
        }

        let (unlocked, locked) = self.recompute_level_locks();
        report.unlocked_levels = unlocked;
        report.locked_levels = locked;

        let first_time = report.first_completion || !report.topic_found;
        let reward = self.rewards.topic_reward(first_time);
        report.xp = self.add_xp(reward);
        report
    }

    /// Like [`complete_topic`](Self::complete_topic), but unknown ids are
    /// errors and leave the state untouched.
    pub fn try_complete_topic(
        &mut self,
        subject_id: SubjectId,
        topic_id: &str,
        score: u32,
    ) -> Result<CompletionReport, EngineError> {
        let subject = self
            .state
            .catalog
            .subject(subject_id)
            .ok_or(EngineError::UnknownSubject(subject_id))?;
        if subject.topic_index(topic_id).is_none() {
            return Err(EngineError::UnknownTopic {
                subject: subject_id,
                topic_id: topic_id.to_string(),
            });
        }
        Ok(self.complete_topic(subject_id, topic_id, score))
    }

    /// Add XP. Level follows from the new total.
    pub fn add_xp(&mut self, amount: u64) -> LevelChange {
        let before = self.state.xp;
        self.state.xp = before.saturating_add(amount);

        let change = LevelChange {
            xp_awarded: self.state.xp - before,
            xp_total: self.state.xp,
            level_before: level_for_xp(before),
            level_after: level_for_xp(self.state.xp),
        };
        if change.leveled_up() {
            info!(
                level = change.level_after,
                xp = change.xp_total,
                "Level up"
            );
        }
        change
    }

    pub fn set_username(&mut self, name: impl Into<String>) {
        self.state.username = name.into();
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.state.mode = mode;
    }

    /// Manual override: open a level regardless of its prerequisites.
    ///
    /// The level is remembered in `manual_unlocks`, so later lock
    /// recomputation keeps it open. Also opens the owning project. Returns
    /// false (and changes nothing) for unknown ids.
    pub fn unlock_project_level(&mut self, project_id: &str, level_id: &str) -> bool {
        let Some(project) = self.state.catalog.project_mut(project_id) else {
            warn!(project = %sanitize_for_log(project_id), "Cannot unlock level of unknown project");
            return false;
        };
        let Some(level) = project.levels.iter_mut().find(|l| l.id == level_id) else {
            warn!(
                project = project_id,
                level = %sanitize_for_log(level_id),
                "Cannot unlock unknown level"
            );
            return false;
        };

        level.is_locked = false;
        project.is_unlocked = true;
        self.state
            .manual_unlocks
            .insert(LevelRef::new(project_id, level_id));
        info!(project = project_id, level = level_id, "Level unlocked by override");
        true
    }

    /// Complete an unlocked project level. Only the first completion awards XP.
    pub fn complete_project_level(
        &mut self,
        project_id: &str,
        level_id: &str,
    ) -> Result<LevelChange, EngineError> {
        let unknown = || EngineError::UnknownLevel {
            project_id: project_id.to_string(),
            level_id: level_id.to_string(),
        };
        let level = self
            .state
            .catalog
            .project_mut(project_id)
            .ok_or_else(unknown)?
            .levels
            .iter_mut()
            .find(|l| l.id == level_id)
            .ok_or_else(unknown)?;

        if level.is_locked {
            return Err(EngineError::LevelLocked {
                project_id: project_id.to_string(),
                level_id: level_id.to_string(),
            });
        }
        if level.is_completed {
            return Ok(LevelChange::none(self.state.xp));
        }

        level.is_completed = true;
        info!(project = project_id, level = level_id, "Project level completed");
        Ok(self.add_xp(self.rewards.xp_per_project_level))
    }

    /// Wipe progress back to the seeded catalog. Username and mode stay.
    pub fn reset(&mut self) {
        self.state.catalog = self.defaults.clone();
        self.state.xp = 0;
        self.state.manual_unlocks.clear();
        info!(user = %sanitize_for_log(&self.state.username), "Progress reset");
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn completed_topic_ids(&self) -> BTreeSet<String> {
        self.state
            .catalog
            .completed_topic_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.state.catalog.subject(id)
    }

    pub fn topic(&self, topic_id: &str) -> Option<(SubjectId, &Topic)> {
        self.state.catalog.topic(topic_id)
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.state.catalog.project(project_id)
    }

    /// Levels currently open, in catalog order
    pub fn unlocked_levels(&self) -> Vec<LevelRef> {
        self.state
            .catalog
            .projects
            .iter()
            .flat_map(|p| {
                p.levels
                    .iter()
                    .filter(|l| !l.is_locked)
                    .map(move |l| LevelRef::new(&p.id, &l.id))
            })
            .collect()
    }

    /// First unlocked topic of a subject that is not completed yet
    pub fn next_topic(&self, subject_id: SubjectId) -> Option<&Topic> {
        self.subject(subject_id)?
            .topics
            .iter()
            .find(|t| t.is_unlocked && !t.is_completed)
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Capture the persistable part of the state
    pub fn snapshot(&self) -> Snapshot {
        let state = &self.state;
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Some(chrono::Utc::now()),
            username: Some(state.username.clone()),
            mode: Some(state.mode),
            xp: Some(state.xp),
            subjects: state
                .catalog
                .subjects
                .iter()
                .map(|s| SubjectSnapshot {
                    id: s.id.to_string(),
                    topics: s
                        .topics
                        .iter()
                        .map(|t| TopicSnapshot {
                            id: t.id.clone(),
                            is_unlocked: t.is_unlocked,
                            is_completed: t.is_completed,
                        })
                        .collect(),
                })
                .collect(),
            projects: state
                .catalog
                .projects
                .iter()
                .map(|p| ProjectSnapshot {
                    id: p.id.clone(),
                    is_unlocked: Some(p.is_unlocked),
                    levels: p
                        .levels
                        .iter()
                        .map(|l| LevelSnapshot {
                            id: l.id.clone(),
                            is_completed: l.is_completed,
                        })
                        .collect(),
                })
                .collect(),
            manual_unlocks: state.manual_unlocks.iter().cloned().collect(),
        }
    }

    /// Replace progress with a snapshot merged over the catalog defaults.
    ///
    /// `None` (a learner with no saved progress) resets to defaults. Entries
    /// naming ids the catalog does not know are ignored; missing entries keep
    /// their default. Derived values are recomputed, and the successor of
    /// every completed topic is unlocked even if the snapshot says otherwise.
    pub fn restore(&mut self, snapshot: Option<&Snapshot>) -> Result<RestoreReport, SnapshotError> {
        let Some(snapshot) = snapshot else {
            self.reset();
            return Ok(RestoreReport::defaults());
        };
        snapshot.check_version()?;

        let mut report = RestoreReport {
            legacy: snapshot.is_legacy(),
            ..Default::default()
        };
        let mut catalog = self.defaults.clone();

        for saved in &snapshot.subjects {
            let subject = match saved.id.parse::<SubjectId>() {
                Ok(id) => catalog.subject_mut(id),
                Err(_) => None,
            };
            let Some(subject) = subject else {
                report.ignored += 1;
                continue;
            };
            for saved_topic in &saved.topics {
                match subject.topics.iter_mut().find(|t| t.id == saved_topic.id) {
                    Some(topic) => {
                        topic.is_completed = saved_topic.is_completed;
                        topic.is_unlocked |= saved_topic.is_unlocked;
                        report.topics_applied += 1;
                    }
                    None => report.ignored += 1,
                }
            }
        }

        for saved in &snapshot.projects {
            let Some(project) = catalog.project_mut(&saved.id) else {
                report.ignored += 1;
                continue;
            };
            if let Some(unlocked) = saved.is_unlocked {
                project.is_unlocked = unlocked;
            }
            for saved_level in &saved.levels {
                match project.levels.iter_mut().find(|l| l.id == saved_level.id) {
                    Some(level) => {
                        level.is_completed = saved_level.is_completed;
                        report.levels_applied += 1;
                    }
                    None => report.ignored += 1,
                }
            }
        }

        let mut manual_unlocks = BTreeSet::new();
        for unlock in &snapshot.manual_unlocks {
            let known = catalog
                .project(&unlock.project_id)
                .and_then(|p| p.level(&unlock.level_id))
                .is_some();
            if known {
                manual_unlocks.insert(unlock.clone());
            } else {
                report.ignored += 1;
            }
        }

        for subject in &mut catalog.subjects {
            repair_unlock_chain(subject);
            subject.recompute_progress();
        }

        self.state.catalog = catalog;
        self.state.manual_unlocks = manual_unlocks;
        self.state.xp = snapshot.xp.unwrap_or(0);
        if let Some(ref name) = snapshot.username {
            self.state.username = name.clone();
        }
        if let Some(mode) = snapshot.mode {
            self.state.mode = mode;
        }
        self.recompute_level_locks();

        if report.ignored > 0 {
            warn!(ignored = report.ignored, "Snapshot referenced ids missing from the catalog");
        }
        debug!(
            topics = report.topics_applied,
            levels = report.levels_applied,
            legacy = report.legacy,
            "Snapshot restored"
        );
        Ok(report)
    }

    /// Re-derive every level lock from the global completed set. Returns the
    /// levels that became unlocked and those that became locked.
    fn recompute_level_locks(&mut self) -> (Vec<LevelRef>, Vec<LevelRef>) {
        let catalog = &mut self.state.catalog;
        let manual = &self.state.manual_unlocks;
        let completed = completed_topic_ids_in(&catalog.subjects);

        let mut unlocked = Vec::new();
        let mut locked = Vec::new();
        for project in catalog.projects.iter_mut() {
            for level in project.levels.iter_mut() {
                let overridden = manual.contains(&LevelRef::new(&project.id, &level.id));
                let now_locked = !overridden && level.derived_lock(&completed);
                if now_locked != level.is_locked {
                    let level_ref = LevelRef::new(&project.id, &level.id);
                    if now_locked {
                        locked.push(level_ref);
                    } else {
                        info!(level = %level_ref, "Project level unlocked");
                        unlocked.push(level_ref);
                    }
                    level.is_locked = now_locked;
                }
            }
        }
        (unlocked, locked)
    }
}

/// Completing topic i always opens topic i + 1
fn repair_unlock_chain(subject: &mut Subject) {
    for i in 1..subject.topics.len() {
        if subject.topics[i - 1].is_completed {
            subject.topics[i].is_unlocked = true;
        }
    }
}
