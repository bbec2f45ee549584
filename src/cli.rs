//! levelup command line
//!
//! Stands in for the web client: every command loads the user's progress,
//! applies one engine action, saves, and prints what changed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::curriculum::{Catalog, Project, Subject, SubjectId, TopicState};
use crate::engine::{CompletionReport, LevelRef, Mode, ProgressionEngine};
use crate::errors::{EngineError, LevelupError};
use crate::session::ProgressSession;
use crate::snapshot::{RestoreReport, Snapshot};
use crate::store::{FileProgressStore, ProgressStore};
use crate::telemetry::init_tracing;
use crate::xp::{xp_to_next_level, LevelChange};

#[derive(Parser, Debug)]
#[command(name = "levelup")]
#[command(about = "Track topic unlocks, project levels and XP for a learner")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Learner to act as (defaults to `default_user` from config)
    #[arg(short, long, value_name = "USER", global = true)]
    user: Option<String>,

    /// Directory holding progress files
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Custom catalog file (TOML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    catalog: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show level, XP, subjects and projects
    #[command(alias = "s")]
    Status,

    /// Mark a topic completed
    Complete {
        /// Subject: APTITUDE, DBMS or OS
        subject: SubjectId,
        /// Topic id, e.g. dbms-er
        topic: String,
        /// Quiz score (informational)
        #[arg(long, default_value_t = 100)]
        score: u32,
        /// Fail on unknown ids instead of ignoring them
        #[arg(long)]
        strict: bool,
    },

    /// Add XP directly
    AddXp {
        amount: u64,
    },

    /// Open a project level regardless of prerequisites
    UnlockLevel {
        project: String,
        level: String,
    },

    /// Mark an unlocked project level completed
    CompleteLevel {
        project: String,
        level: String,
    },

    /// Switch between learning topics and building projects
    Mode {
        #[arg(value_enum)]
        mode: Mode,
    },

    /// Change the display name
    Rename {
        name: String,
    },

    /// Wipe all progress for the user
    Reset,

    /// Print the user's snapshot as JSON
    Export,

    /// Replace the user's progress with a snapshot file
    Import {
        file: PathBuf,
    },

    /// Show the curriculum catalog
    Catalog,

    /// List users with saved progress
    Users,
}

impl Commands {
    fn mutates(&self) -> bool {
        !matches!(
            self,
            Commands::Status | Commands::Export | Commands::Catalog | Commands::Users
        )
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with(cli).await
}

pub async fn run_with(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_deref())
        .map_err(|e| LevelupError::Config(format!("{:#}", e)))?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    if let Some(catalog) = cli.catalog.clone() {
        config.catalog = Some(catalog);
    }

    let filter = if cli.verbose {
        "debug"
    } else {
        config.logging.filter.as_str()
    };
    init_tracing(filter, config.logging.json);

    let catalog = config.load_catalog()?;
    let format = cli.format;

    match cli.command {
        Commands::Catalog => return print_catalog(&catalog, format),
        Commands::Users => {
            let store = FileProgressStore::new(&config.data_dir)?;
            return print_users(&store, format).await;
        }
        _ => {}
    }

    let user = cli
        .user
        .clone()
        .or_else(|| config.default_user.clone())
        .ok_or_else(|| {
            LevelupError::Config("no user given: pass --user or set default_user".to_string())
        })?;

    let store: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(&config.data_dir)?);
    let engine = ProgressionEngine::new(catalog, config.reward_policy());
    let (session, _) = ProgressSession::open(user, engine, store).await?;
    let session = session.without_autosave();

    let mutates = cli.command.mutates();
    match cli.command {
        Commands::Status => print_status(&session, format)?,
        Commands::Complete {
            subject,
            topic,
            score,
            strict,
        } => {
            let report = if strict {
                session
                    .try_complete_topic(subject, &topic, score)
                    .map_err(LevelupError::from)?
            } else {
                session.complete_topic(subject, &topic, score)
            };
            print_completion(&report, format)?;
        }
        Commands::AddXp { amount } => {
            let change = session.add_xp(amount);
            print_level_change(&change, format)?;
        }
        Commands::UnlockLevel { project, level } => {
            if !session.unlock_project_level(&project, &level) {
                return Err(LevelupError::Engine(EngineError::UnknownLevel {
                    project_id: project,
                    level_id: level,
                })
                .into());
            }
            emit(
                format,
                &serde_json::json!({ "unlocked": LevelRef::new(&project, &level) }),
                || println!("{} {}/{}", "Unlocked".green().bold(), project, level),
            )?;
        }
        Commands::CompleteLevel { project, level } => {
            let change = session
                .complete_project_level(&project, &level)
                .map_err(LevelupError::from)?;
            print_level_change(&change, format)?;
        }
        Commands::Mode { mode } => {
            session.set_mode(mode);
            emit(format, &serde_json::json!({ "mode": mode }), || {
                println!("Mode set to {}", mode.to_string().cyan())
            })?;
        }
        Commands::Rename { name } => {
            session.set_username(name.clone());
            emit(format, &serde_json::json!({ "username": name }), || {
                println!("Username set to {}", name.cyan())
            })?;
        }
        Commands::Reset => {
            session.reset();
            emit(format, &serde_json::json!({ "reset": true }), || {
                println!("{}", "Progress reset".yellow())
            })?;
        }
        Commands::Export => {
            println!("{}", session.snapshot().to_json_pretty()?);
        }
        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let snapshot = Snapshot::from_json(&json).map_err(LevelupError::from)?;
            let report = session.import(snapshot.as_ref())?;
            print_restore(&report, format)?;
        }
        // Answered before a session is opened
        Commands::Catalog | Commands::Users => {}
    }

    if mutates {
        session.persist().await.map_err(LevelupError::from)?;
    }
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

/// Print `value` as JSON, or run `text` for human output
fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce()) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView<'a> {
    username: &'a str,
    mode: Mode,
    xp: u64,
    level: u32,
    xp_to_next_level: u64,
    subjects: &'a [Subject],
    projects: &'a [Project],
}

fn print_status(session: &ProgressSession, format: OutputFormat) -> Result<()> {
    session.read(|state| {
        let view = StatusView {
            username: state.username(),
            mode: state.mode(),
            xp: state.xp(),
            level: state.level(),
            xp_to_next_level: xp_to_next_level(state.xp()),
            subjects: state.subjects(),
            projects: state.projects(),
        };
        emit(format, &view, || {
            println!(
                "{}  Level {}  {} XP ({} to next)  mode: {}",
                view.username.bold(),
                view.level.to_string().green().bold(),
                view.xp,
                view.xp_to_next_level,
                view.mode
            );
            println!();
            for subject in view.subjects {
                print_subject(subject);
            }
            println!("{}", "Projects".bold());
            for project in view.projects {
                let title = if project.is_unlocked {
                    project.title.normal()
                } else {
                    project.title.dimmed()
                };
                println!("  {} {}", project.id.cyan(), title);
                for level in &project.levels {
                    let mark = if level.is_completed {
                        "✓".green()
                    } else if level.is_locked {
                        "·".dimmed()
                    } else {
                        "○".yellow()
                    };
                    println!("    {} {:<12} {}", mark, level.id, level.title);
                }
            }
        })
    })
}

fn print_subject(subject: &Subject) {
    let filled = usize::from(subject.progress) / 10;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(10 - filled));
    println!(
        "{} {}  [{}] {}%",
        subject.id.to_string().bold(),
        subject.title,
        bar,
        subject.progress
    );
    for topic in &subject.topics {
        let mark = match topic.state() {
            TopicState::Completed => "✓".green(),
            TopicState::Unlocked => "○".yellow(),
            TopicState::Locked => "·".dimmed(),
        };
        println!("  {} {:<20} {}", mark, topic.id, topic.title);
    }
    println!();
}

fn print_completion(report: &CompletionReport, format: OutputFormat) -> Result<()> {
    emit(format, report, || {
        if !report.subject_found {
            println!(
                "{} subject {} is not in the catalog; nothing changed",
                "Ignored:".yellow(),
                report.subject
            );
            return;
        }
        if report.topic_found {
            println!("{} {} / {}", "Completed".green().bold(), report.subject, report.topic_id);
        } else {
            println!(
                "{} topic '{}' is not in {}",
                "Unknown:".yellow(),
                report.topic_id,
                report.subject
            );
        }
        if let Some(ref next) = report.unlocked_topic {
            println!("  Unlocked topic {}", next.cyan());
        }
        for level in &report.unlocked_levels {
            println!("  Unlocked project level {}", level.to_string().cyan());
        }
        print_xp_line(&report.xp);
    })
}

fn print_level_change(change: &LevelChange, format: OutputFormat) -> Result<()> {
    emit(format, change, || print_xp_line(change))
}

fn print_xp_line(change: &LevelChange) {
    println!("  +{} XP  (total {})", change.xp_awarded, change.xp_total);
    if change.leveled_up() {
        println!(
            "  {} {} -> {}",
            "Level up!".green().bold(),
            change.level_before,
            change.level_after
        );
    }
}

fn print_restore(report: &RestoreReport, format: OutputFormat) -> Result<()> {
    emit(format, report, || {
        if report.used_defaults {
            println!("Imported empty progress; reset to defaults");
            return;
        }
        println!(
            "Imported {} topics, {} levels ({} ignored{})",
            report.topics_applied,
            report.levels_applied,
            report.ignored,
            if report.legacy { ", legacy format" } else { "" }
        );
    })
}

fn print_catalog(catalog: &Catalog, format: OutputFormat) -> Result<()> {
    emit(format, catalog, || {
        for subject in &catalog.subjects {
            println!("{} {}", subject.id.to_string().bold(), subject.title);
            for (i, topic) in subject.topics.iter().enumerate() {
                println!("  {:>2}. {:<20} {}", i + 1, topic.id, topic.title);
            }
        }
        println!();
        for project in &catalog.projects {
            println!("{} {}", project.id.cyan(), project.title);
            for level in &project.levels {
                let requires = if level.required_topic_ids.is_empty() {
                    "-".to_string()
                } else {
                    level.required_topic_ids.join(", ")
                };
                println!("  {:<12} requires {}", level.id, requires);
            }
        }
    })
}

async fn print_users(store: &dyn ProgressStore, format: OutputFormat) -> Result<()> {
    let users = store.list().await.map_err(LevelupError::from)?;
    emit(format, &users, || {
        if users.is_empty() {
            println!("No saved progress");
        }
        for user in &users {
            println!(
                "{:<24} {:>6} XP  {:>3} topics  saved {}",
                user.user_id,
                user.xp,
                user.completed_topics,
                user.saved_at.format("%Y-%m-%d %H:%M")
            );
        }
    })
}
