//! Swarm tuning: phase timeouts and score magnitudes.

use std::time::Duration;

use serde::Deserialize;

use crate::election::ElectionPolicy;

/// Coordinator configuration. Every field has a default, so a partial TOML table is fine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// How long candidates may answer `interested` (default 1000 ms).
    pub interested_timeout_ms: u64,
    /// How long the elected peer has to satisfy a `request` (default 3000 ms).
    pub request_timeout_ms: u64,
    /// Reward and punishment per round outcome.
    pub points: i64,
    /// Margin below the worst peer applied by a penalty.
    pub penalty_points: i64,
    /// Score of a freshly added peer.
    pub baseline_score: i64,
    /// Late successes tolerated before a penalty.
    pub late_threshold: u32,
    /// Cap on broadcast recipients; unset means every peer.
    pub max_contributors: Option<usize>,
    pub election: ElectionPolicy,
}

impl Config {
    pub fn interested_timeout(&self) -> Duration {
        Duration::from_millis(self.interested_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interested_timeout_ms: 1000,
            request_timeout_ms: 3000,
            points: 1,
            penalty_points: 1,
            baseline_score: 0,
            late_threshold: 3,
            max_contributors: None,
            election: ElectionPolicy::default(),
        }
    }
}
