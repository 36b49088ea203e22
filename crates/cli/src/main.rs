mod cli;
mod config;
mod pipeline;
mod runner;
mod terminal;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::resolve_config;
use crate::pipeline::Pipeline;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Logs go to stderr so the summary on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let terminal = Terminal::new();

    let result = match args.command {
        Command::Run(run) => run_command(run, &terminal).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "run failed");
            if let Err(e) = terminal.print_error(&format!("{e:#}")) {
                error!(error = %e, "failed to write to stdout");
            }
            ExitCode::from(2)
        }
    }
}

async fn run_command(args: RunArgs, terminal: &Terminal) -> Result<ExitCode> {
    let pipeline = Pipeline::load(&args.pipeline)?;
    let config = resolve_config(&args, pipeline.scheduler.clone())?;

    if args.dry_run {
        terminal.print_plan(&pipeline)?;
        return Ok(ExitCode::SUCCESS);
    }

    let report = runner::run_pipeline(pipeline, config).await?;
    terminal.print_summary(&report)?;

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
