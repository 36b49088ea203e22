use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run command pipelines with dependency ordering and a concurrency ceiling.
#[derive(Parser, Debug)]
#[command(name = "tickler", version, about = "Dependency-aware job runner")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every job in a pipeline file and report the outcomes.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Pipeline TOML file with `[[job]]` tables
    pub pipeline: PathBuf,

    /// Maximum number of jobs in flight (overrides every config source)
    #[arg(long, short = 'j', env = "TICKLER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Scheduler config file; takes precedence over the pipeline's [scheduler] table
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Validate the pipeline and print the dispatch order without running anything
    #[arg(long)]
    pub dry_run: bool,
}
