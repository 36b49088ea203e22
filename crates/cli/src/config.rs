use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use tickler::SchedulerConfig;

use crate::cli::RunArgs;

/// Build the scheduler config for a run.
///
/// Priority: `--concurrency` > `TICKLER_*` environment > `--config` file >
/// pipeline `[scheduler]` table > defaults. Each source replaces only the
/// fields it sets.
pub fn resolve_config(args: &RunArgs, from_pipeline: Option<SchedulerConfig>) -> Result<SchedulerConfig> {
    let mut config = from_pipeline.unwrap_or_default();
    if let Some(path) = &args.config {
        config = overlay_file(config, path)?;
    }
    config.apply_env_overrides();
    if let Some(limit) = args.concurrency {
        config.concurrency_limit = limit;
    }
    config.validate()?;
    debug!(?config, "resolved scheduler config");
    Ok(config)
}

fn overlay_file(base: SchedulerConfig, path: &Path) -> Result<SchedulerConfig> {
    debug!(path = %path.display(), "loading scheduler config");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scheduler config: {}", path.display()))?;
    let overlay: toml::Table = toml::from_str(&content)
        .with_context(|| format!("failed to parse scheduler config: {}", path.display()))?;
    overlay_table(base, overlay)
        .with_context(|| format!("invalid scheduler config: {}", path.display()))
}

/// Replace the fields of `base` that `overlay` sets.
fn overlay_table(base: SchedulerConfig, overlay: toml::Table) -> Result<SchedulerConfig> {
    let mut merged = toml::Table::try_from(&base)?;
    merged.extend(overlay);
    let config: SchedulerConfig = merged.try_into()?;
    Ok(config)
}
