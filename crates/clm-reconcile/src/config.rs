//! Reconciler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing knobs for subreconcilers and the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Delay requested while processes wait for a configuration update
    #[serde(default = "default_pod_scheduling_delay")]
    pub pod_scheduling_delay_secs: u64,

    /// Smallest retry delay
    #[serde(default = "default_min_backoff")]
    pub min_backoff_ms: u64,

    /// Upper bound for backed-off retries
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Interval between passes over a converged cluster
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Time budget for one pass
    #[serde(default = "default_pass_timeout")]
    pub pass_timeout_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pod_scheduling_delay_secs: default_pod_scheduling_delay(),
            min_backoff_ms: default_min_backoff(),
            max_backoff_secs: default_max_backoff(),
            resync_interval_secs: default_resync_interval(),
            pass_timeout_secs: default_pass_timeout(),
        }
    }
}

impl ReconcilerConfig {
    pub fn pod_scheduling_delay(&self) -> Duration {
        Duration::from_secs(self.pod_scheduling_delay_secs)
    }

    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    /// Exponential backoff for the `attempt`-th consecutive retry (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.min_backoff()
            .saturating_mul(factor)
            .min(self.max_backoff())
    }
}

fn default_pod_scheduling_delay() -> u64 {
    15
}

fn default_min_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    300
}

fn default_resync_interval() -> u64 {
    60
}

fn default_pass_timeout() -> u64 {
    120
}
