//! XP and Level Formula
//!
//! `level = floor(sqrt(xp / 100)) + 1`. Level n begins at `xp = 100 * (n - 1)^2`.
//! The integer square root gives the same answer as the float formula
//! without rounding drift at large xp.

use serde::{Deserialize, Serialize};

/// XP divisor in the level formula
pub const XP_SCALE: u64 = 100;

/// Default reward for completing a topic
pub const DEFAULT_TOPIC_XP: u64 = 100;

/// Default reward for completing a project level
pub const DEFAULT_PROJECT_LEVEL_XP: u64 = 250;

/// Level reached at the given XP total. Level 1 at zero XP.
pub fn level_for_xp(xp: u64) -> u32 {
    ((xp / XP_SCALE).isqrt() + 1) as u32
}

/// Minimum XP required to reach `level`
pub fn xp_for_level(level: u32) -> u64 {
    let n = u64::from(level.saturating_sub(1));
    XP_SCALE.saturating_mul(n.saturating_mul(n))
}

/// XP still needed to reach the next level
pub fn xp_to_next_level(xp: u64) -> u64 {
    let next = level_for_xp(xp).saturating_add(1);
    xp_for_level(next).saturating_sub(xp)
}

/// Level before and after an XP change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelChange {
    pub xp_awarded: u64,
    pub xp_total: u64,
    pub level_before: u32,
    pub level_after: u32,
}

impl LevelChange {
    pub fn none(xp_total: u64) -> Self {
        let level = level_for_xp(xp_total);
        Self {
            xp_awarded: 0,
            xp_total,
            level_before: level,
            level_after: level,
        }
    }

    pub fn leveled_up(&self) -> bool {
        self.level_after > self.level_before
    }
}

/// What happens when a topic that is already completed is completed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayPolicy {
    /// Award XP for every completion, including repeats
    #[default]
    Award,
    /// Award XP only for the first completion of a topic
    Ignore,
}

/// XP rewards applied by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
    pub xp_per_completion: u64,
    pub xp_per_project_level: u64,
    pub replay: ReplayPolicy,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            xp_per_completion: DEFAULT_TOPIC_XP,
            xp_per_project_level: DEFAULT_PROJECT_LEVEL_XP,
            replay: ReplayPolicy::Award,
        }
    }
}

impl RewardPolicy {
    pub fn with_replay(mut self, replay: ReplayPolicy) -> Self {
        self.replay = replay;
        self
    }

    /// XP for a topic completion; `first_time` is false for repeats
    pub fn topic_reward(&self, first_time: bool) -> u64 {
        match (first_time, self.replay) {
            (true, _) | (false, ReplayPolicy::Award) => self.xp_per_completion,
            (false, ReplayPolicy::Ignore) => 0,
        }
    }
}
