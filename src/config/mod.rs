//! Configuration Management
//!
//! Loads levelup configuration from TOML files.
//! Configuration includes:
//! - Where progress snapshots are stored
//! - An optional custom curriculum catalog
//! - XP rewards and the repeat-completion rule
//! - Logging filter and format

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::curriculum::Catalog;
use crate::xp::{ReplayPolicy, RewardPolicy, DEFAULT_PROJECT_LEVEL_XP, DEFAULT_TOPIC_XP};

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "levelup.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding per-user progress files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Custom catalog file (TOML or JSON); builtin curriculum when unset
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// User to act as when `--user` is not given
    #[serde(default)]
    pub default_user: Option<String>,

    #[serde(default)]
    pub rewards: RewardConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// XP rewards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_topic_xp")]
    pub xp_per_completion: u64,
    #[serde(default = "default_project_level_xp")]
    pub xp_per_project_level: u64,
    /// Award XP again when an already-completed topic is completed
    #[serde(default = "default_true")]
    pub award_repeat_completions: bool,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            xp_per_completion: default_topic_xp(),
            xp_per_project_level: default_project_level_xp(),
            award_repeat_completions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "levelup=debug"
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of compact text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog: None,
            default_user: None,
            rewards: RewardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("levelup")
}
fn default_topic_xp() -> u64 {
    DEFAULT_TOPIC_XP
}
fn default_project_level_xp() -> u64 {
    DEFAULT_PROJECT_LEVEL_XP
}
fn default_true() -> bool {
    true
}
fn default_log_filter() -> String {
    crate::telemetry::DEFAULT_FILTER.to_string()
}

impl Config {
    /// Load from `path`, or from the default locations, then apply
    /// `LEVELUP_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let home_config =
                    dirs::home_dir().map(|h| h.join(".config/levelup/config.toml"));
                let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE))
                    .chain(home_config);

                let mut loaded = None;
                for candidate in candidates {
                    if candidate.is_file() {
                        loaded = Some(Self::from_file(&candidate)?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Apply environment-style overrides through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("LEVELUP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(catalog) = lookup("LEVELUP_CATALOG") {
            self.catalog = Some(PathBuf::from(catalog));
        }
        if let Some(user) = lookup("LEVELUP_USER") {
            self.default_user = Some(user);
        }
        if let Some(filter) = lookup("LEVELUP_LOG") {
            self.logging.filter = filter;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            bail!("data_dir must not be empty");
        }
        if self.rewards.xp_per_completion == 0 {
            bail!("rewards.xp_per_completion must be greater than zero");
        }
        Ok(())
    }

    pub fn reward_policy(&self) -> RewardPolicy {
        RewardPolicy {
            xp_per_completion: self.rewards.xp_per_completion,
            xp_per_project_level: self.rewards.xp_per_project_level,
            replay: if self.rewards.award_repeat_completions {
                ReplayPolicy::Award
            } else {
                ReplayPolicy::Ignore
            },
        }
    }

    /// The configured catalog, or the builtin one
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display())),
            None => Ok(Catalog::builtin()),
        }
    }
}
