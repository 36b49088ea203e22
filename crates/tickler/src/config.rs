use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{Result, SchedulerError};

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of dispatched jobs at any moment.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// How many finalized job outcomes to remember for late-registering
    /// dependents. 0 disables the table.
    #[serde(default = "default_retained_results")]
    pub retained_results: usize,
    /// How many distinct job names keep per-name metrics (execution count,
    /// average body time, last finish). The oldest name is evicted first.
    #[serde(default = "default_tracked_jobs")]
    pub tracked_jobs: usize,
}

fn default_concurrency_limit() -> usize { 100 }
fn default_retained_results() -> usize { 1024 }
fn default_tracked_jobs() -> usize { 1024 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            retained_results: default_retained_results(),
            tracked_jobs: default_tracked_jobs(),
        }
    }
}

impl SchedulerConfig {
    /// Default config with a custom concurrency ceiling.
    pub fn with_limit(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit,
            ..Self::default()
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(SchedulerError::Config(
                "concurrency_limit must be at least 1".into(),
            ));
        }
        if self.concurrency_limit > Semaphore::MAX_PERMITS {
            return Err(SchedulerError::Config(format!(
                "concurrency_limit must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply overrides from the process environment.
    ///
    /// - `TICKLER_CONCURRENCY_LIMIT` -> `concurrency_limit`
    /// - `TICKLER_RETAINED_RESULTS` -> `retained_results`
    /// - `TICKLER_TRACKED_JOBS` -> `tracked_jobs`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(limit) = lookup("TICKLER_CONCURRENCY_LIMIT").and_then(|v| v.parse().ok()) {
            self.concurrency_limit = limit;
        }
        if let Some(n) = lookup("TICKLER_RETAINED_RESULTS").and_then(|v| v.parse().ok()) {
            self.retained_results = n;
        }
        if let Some(n) = lookup("TICKLER_TRACKED_JOBS").and_then(|v| v.parse().ok()) {
            self.tracked_jobs = n;
        }
    }
}
