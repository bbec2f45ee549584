//! Curriculum Catalog
//!
//! Static description of what can be learned:
//! - Subjects, each an ordered list of topics forming a linear unlock chain
//! - Projects, each an ordered list of levels gated on prerequisite topics
//!
//! Catalogs come from the builtin seed data or from a TOML/JSON file. Field
//! names serialize in camelCase so the same shapes can be exchanged with the
//! web client.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::errors::CatalogError;

// ============================================================================
// Identifiers
// ============================================================================

/// Subject identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectId {
    Aptitude,
    Dbms,
    Os,
}

impl SubjectId {
    pub const ALL: [SubjectId; 3] = [SubjectId::Aptitude, SubjectId::Dbms, SubjectId::Os];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectId::Aptitude => "APTITUDE",
            SubjectId::Dbms => "DBMS",
            SubjectId::Os => "OS",
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APTITUDE" => Ok(SubjectId::Aptitude),
            "DBMS" => Ok(SubjectId::Dbms),
            "OS" => Ok(SubjectId::Os),
            other => Err(format!(
                "unknown subject '{}' (expected APTITUDE, DBMS or OS)",
                other
            )),
        }
    }
}

// ============================================================================
// Topics and Subjects
// ============================================================================

/// A single learning unit within a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub is_completed: bool,
    /// Link to the simulation module that teaches this topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

impl Topic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            is_unlocked: false,
            is_completed: false,
            module_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    pub fn unlocked(mut self) -> Self {
        self.is_unlocked = true;
        self
    }

    pub fn state(&self) -> TopicState {
        if self.is_completed {
            TopicState::Completed
        } else if self.is_unlocked {
            TopicState::Unlocked
        } else {
            TopicState::Locked
        }
    }
}

/// Lifecycle of a topic. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicState {
    Locked,
    Unlocked,
    Completed,
}

/// An ordered collection of topics; list order is the unlock sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub topics: Vec<Topic>,
    /// Percentage of topics completed (0-100)
    #[serde(default)]
    pub progress: u8,
}

impl Subject {
    pub fn new(id: SubjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            topics: Vec::new(),
            progress: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topics.push(topic);
        self
    }

    pub fn topic_index(&self, topic_id: &str) -> Option<usize> {
        self.topics.iter().position(|t| t.id == topic_id)
    }

    pub fn completed_count(&self) -> usize {
        self.topics.iter().filter(|t| t.is_completed).count()
    }

    /// Recompute `progress` from completion flags (integer percent, rounded down)
    pub fn recompute_progress(&mut self) {
        self.progress = if self.topics.is_empty() {
            0
        } else {
            (self.completed_count() * 100 / self.topics.len()) as u8
        };
    }
}

// ============================================================================
// Projects
// ============================================================================

/// One level of a project, gated on topics from any subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLevel {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_topic_ids: Vec<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_completed: bool,
}

impl ProjectLevel {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            required_topic_ids: Vec::new(),
            is_locked: false,
            is_completed: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires(mut self, topic_ids: &[&str]) -> Self {
        self.required_topic_ids
            .extend(topic_ids.iter().map(|s| s.to_string()));
        self
    }

    /// Locked iff there are prerequisites and at least one is not completed.
    pub fn derived_lock(&self, completed: &BTreeSet<&str>) -> bool {
        !self.required_topic_ids.is_empty()
            && !self
                .required_topic_ids
                .iter()
                .all(|id| completed.contains(id.as_str()))
    }

    pub fn missing_topics<'a>(&'a self, completed: &BTreeSet<&str>) -> Vec<&'a str> {
        self.required_topic_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !completed.contains(id))
            .collect()
    }
}

/// A separate progression track made of levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub levels: Vec<ProjectLevel>,
    #[serde(default)]
    pub is_unlocked: bool,
}

impl Project {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            levels: Vec::new(),
            is_unlocked: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_level(mut self, level: ProjectLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn unlocked(mut self) -> Self {
        self.is_unlocked = true;
        self
    }

    pub fn level(&self, level_id: &str) -> Option<&ProjectLevel> {
        self.levels.iter().find(|l| l.id == level_id)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Full curriculum: subjects and projects
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.push(project);
        self
    }

    /// Parse a catalog from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Parse a catalog from JSON
    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Load, validate and normalize a catalog file. `.json` files are parsed
    /// as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let mut catalog = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        catalog.validate()?;
        catalog.normalize();
        Ok(catalog)
    }

    /// Check structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut subjects_seen = HashSet::new();
        let mut topic_owner: HashMap<&str, SubjectId> = HashMap::new();

        for subject in &self.subjects {
            if !subjects_seen.insert(subject.id) {
                return Err(CatalogError::DuplicateSubject(subject.id));
            }
            if subject.topics.is_empty() {
                return Err(CatalogError::EmptySubject(subject.id));
            }
            for topic in &subject.topics {
                if let Some(first) = topic_owner.insert(&topic.id, subject.id) {
                    return Err(CatalogError::DuplicateTopic {
                        topic_id: topic.id.clone(),
                        first,
                        second: subject.id,
                    });
                }
            }
        }

        let mut projects_seen = HashSet::new();
        for project in &self.projects {
            if !projects_seen.insert(project.id.as_str()) {
                return Err(CatalogError::DuplicateProject(project.id.clone()));
            }
            let mut levels_seen = HashSet::new();
            for level in &project.levels {
                if !levels_seen.insert(level.id.as_str()) {
                    return Err(CatalogError::DuplicateLevel {
                        project_id: project.id.clone(),
                        level_id: level.id.clone(),
                    });
                }
                if let Some(missing) = level
                    .required_topic_ids
                    .iter()
                    .find(|id| !topic_owner.contains_key(id.as_str()))
                {
                    return Err(CatalogError::UnknownPrerequisite {
                        project_id: project.id.clone(),
                        level_id: level.id.clone(),
                        topic_id: missing.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Bring the catalog to its seeded state: nothing completed, the first
    /// topic of every subject unlocked, level locks derived from an empty
    /// completed set. Extra seed unlocks already present are kept.
    pub fn normalize(&mut self) {
        for subject in &mut self.subjects {
            for topic in &mut subject.topics {
                topic.is_completed = false;
            }
            if let Some(first) = subject.topics.first_mut() {
                first.is_unlocked = true;
            }
            subject.progress = 0;
        }

        let empty = BTreeSet::new();
        for level in self.projects.iter_mut().flat_map(|p| p.levels.iter_mut()) {
            level.is_completed = false;
            level.is_locked = level.derived_lock(&empty);
        }
    }

    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn subject_mut(&mut self, id: SubjectId) -> Option<&mut Subject> {
        self.subjects.iter_mut().find(|s| s.id == id)
    }

    /// Find a topic anywhere in the catalog
    pub fn topic(&self, topic_id: &str) -> Option<(SubjectId, &Topic)> {
        self.subjects.iter().find_map(|s| {
            s.topics
                .iter()
                .find(|t| t.id == topic_id)
                .map(|t| (s.id, t))
        })
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    pub fn project_mut(&mut self, project_id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == project_id)
    }

    pub fn topic_count(&self) -> usize {
        self.subjects.iter().map(|s| s.topics.len()).sum()
    }

    pub fn level_count(&self) -> usize {
        self.projects.iter().map(|p| p.levels.len()).sum()
    }

    /// Completed topic ids across all subjects
    pub fn completed_topic_ids(&self) -> BTreeSet<&str> {
        completed_topic_ids_in(&self.subjects)
    }

    /// The seeded default curriculum
    pub fn builtin() -> Self {
        let mut catalog = Catalog::new()
            .with_subject(builtin_aptitude())
            .with_subject(builtin_dbms())
            .with_subject(builtin_os())
            .with_project(
                Project::new("library-db", "Library Management Database")
                    .with_description("Design and build the database behind a campus library")
                    .unlocked()
                    .with_level(
                        ProjectLevel::new("schema", "Sketch the schema")
                            .with_description("Model books, members and loans as an ER diagram")
                            .requires(&["dbms-er"]),
                    )
                    .with_level(
                        ProjectLevel::new("normalize", "Normalize the tables")
                            .with_description("Turn the ER model into 3NF relations")
                            .requires(&["dbms-relational", "dbms-normalization"]),
                    )
                    .with_level(
                        ProjectLevel::new("queries", "Write the reports")
                            .with_description("Overdue loans, popular titles, member history")
                            .requires(&["dbms-sql"]),
                    )
                    .with_level(
                        ProjectLevel::new("concurrency", "Handle concurrent checkouts")
                            .with_description("Two members, one copy: keep the loan table consistent")
                            .requires(&["dbms-transactions", "os-sync"]),
                    ),
            )
            .with_project(
                Project::new("process-sim", "Process Scheduler Simulator")
                    .with_description("Simulate how an operating system juggles processes")
                    .unlocked()
                    .with_level(
                        ProjectLevel::new("kickoff", "Project kickoff")
                            .with_description("Read the brief and set up the simulator skeleton"),
                    )
                    .with_level(
                        ProjectLevel::new("scheduler", "Implement the scheduler")
                            .with_description("FCFS, SJF and round robin over a process table")
                            .requires(&["os-processes", "os-scheduling"]),
                    )
                    .with_level(
                        ProjectLevel::new("memory", "Add a memory manager")
                            .with_description("Paging with a simple replacement policy")
                            .requires(&["os-memory", "os-virtual-memory"]),
                    )
                    .with_level(
                        ProjectLevel::new("deadlock", "Detect deadlocks")
                            .with_description("Resource allocation graph and banker's algorithm")
                            .requires(&["os-sync", "os-deadlocks"]),
                    ),
            )
            .with_project(
                Project::new("placement-prep", "Placement Prep Sprint")
                    .with_description("Timed mock rounds mixing aptitude and core CS")
                    .with_level(
                        ProjectLevel::new("warmup", "Warm-up round")
                            .requires(&["apt-percentages", "apt-ratios"]),
                    )
                    .with_level(
                        ProjectLevel::new("mock-test", "Full mock test")
                            .requires(&["apt-profit-loss", "apt-time-work", "apt-speed-distance"]),
                    )
                    .with_level(
                        ProjectLevel::new("final", "Final round")
                            .requires(&["apt-probability", "dbms-sql", "os-scheduling"]),
                    ),
            );
        catalog.normalize();
        catalog
    }
}

/// Completed topic ids across the given subjects
pub fn completed_topic_ids_in(subjects: &[Subject]) -> BTreeSet<&str> {
    subjects
        .iter()
        .flat_map(|s| s.topics.iter())
        .filter(|t| t.is_completed)
        .map(|t| t.id.as_str())
        .collect()
}

fn builtin_aptitude() -> Subject {
    Subject::new(SubjectId::Aptitude, "Quantitative Aptitude")
        .with_description("Arithmetic and reasoning drills for placement tests")
        .with_topic(
            Topic::new("apt-percentages", "Percentages")
                .with_description("Percentage change, successive discounts")
                .with_module("aptitude-percentages")
                .unlocked(),
        )
        .with_topic(
            Topic::new("apt-ratios", "Ratio & Proportion")
                .with_description("Ratios, partnerships, mixtures")
                .with_module("aptitude-ratios"),
        )
        .with_topic(
            Topic::new("apt-profit-loss", "Profit & Loss")
                .with_description("Cost price, selling price, marked price")
                .with_module("aptitude-profit-loss"),
        )
        .with_topic(
            Topic::new("apt-time-work", "Time & Work")
                .with_description("Work rates, pipes and cisterns")
                .with_module("aptitude-time-work"),
        )
        .with_topic(
            Topic::new("apt-speed-distance", "Speed, Time & Distance")
                .with_description("Relative speed, trains, boats and streams")
                .with_module("aptitude-speed-distance"),
        )
        .with_topic(
            Topic::new("apt-probability", "Probability")
                .with_description("Counting, dice, cards and conditional probability")
                .with_module("aptitude-probability"),
        )
}

fn builtin_dbms() -> Subject {
    Subject::new(SubjectId::Dbms, "Database Management Systems")
        .with_description("From ER diagrams to transactions")
        .with_topic(
            Topic::new("dbms-er", "ER Modelling")
                .with_description("Entities, relationships, cardinality")
                .with_module("dbms-er-builder")
                .unlocked(),
        )
        .with_topic(
            Topic::new("dbms-relational", "Relational Model")
                .with_description("Relations, keys, relational algebra")
                .with_module("dbms-relational"),
        )
        .with_topic(
            Topic::new("dbms-normalization", "Normalization")
                .with_description("Functional dependencies, 1NF through BCNF")
                .with_module("dbms-normalization"),
        )
        .with_topic(
            Topic::new("dbms-sql", "SQL Queries")
                .with_description("Joins, grouping, subqueries")
                .with_module("dbms-sql-runner"),
        )
        .with_topic(
            Topic::new("dbms-transactions", "Transactions & ACID")
                .with_description("Schedules, serializability, locking")
                .with_module("dbms-transactions"),
        )
        .with_topic(
            Topic::new("dbms-indexing", "Indexing & B+ Trees")
                .with_description("Dense and sparse indexes, B+ tree operations")
                .with_module("dbms-indexing"),
        )
}

fn builtin_os() -> Subject {
    Subject::new(SubjectId::Os, "Operating Systems")
        .with_description("Processes, scheduling, memory")
        .with_topic(
            Topic::new("os-processes", "Processes & Threads")
                .with_description("Process states, PCB, context switching")
                .with_module("os-process-states")
                .unlocked(),
        )
        .with_topic(
            Topic::new("os-scheduling", "CPU Scheduling")
                .with_description("FCFS, SJF, priority, round robin")
                .with_module("os-scheduler"),
        )
        .with_topic(
            Topic::new("os-sync", "Process Synchronization")
                .with_description("Critical sections, semaphores, monitors")
                .with_module("os-sync"),
        )
        .with_topic(
            Topic::new("os-deadlocks", "Deadlocks")
                .with_description("Conditions, prevention, banker's algorithm")
                .with_module("os-deadlocks"),
        )
        .with_topic(
            Topic::new("os-memory", "Memory Management")
                .with_description("Contiguous allocation, fragmentation")
                .with_module("os-memory"),
        )
        .with_topic(
            Topic::new("os-virtual-memory", "Virtual Memory & Paging")
                .with_description("Page tables, TLB, page replacement")
                .with_module("os-paging"),
        )
}
