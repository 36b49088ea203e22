use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

use tickler::JobOutcome;

use crate::pipeline::Pipeline;
use crate::runner::{JobReport, RunReport};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const SUCCESS: Color = Color::Green;
    const FAILURE: Color = Color::Red;
    const PENDING: Color = Color::Yellow;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Writes run reports to stdout. Logs go to stderr through tracing.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the dispatch order of a validated pipeline.
    pub fn print_plan(&self, pipeline: &Pipeline) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print(format!("{} jobs in dispatch order\n", pipeline.jobs.len())),
            ResetColor,
        )?;
        for (i, job) in pipeline.jobs.iter().enumerate() {
            execute!(
                stdout,
                Print(format!("{:>3}. {:<20} ", i + 1, job.name)),
                SetForegroundColor(Colors::DIM),
                Print(format!("{}{}\n", job.command_line(), dependency_note(job))),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// One line per job with its outcome, then a totals line.
    pub fn print_summary(&self, report: &RunReport) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Print("\n"))?;
        for job in &report.jobs {
            let (label, color) = outcome_label(job);
            execute!(
                stdout,
                SetForegroundColor(color),
                Print(format!("{label:<8}")),
                ResetColor,
                Print(format!("{:<20} ", job.name)),
                SetForegroundColor(Colors::DIM),
                Print(format!("{}\n", job_detail(job))),
                ResetColor,
            )?;
        }

        let failures = report.failures();
        let color = if report.success() {
            Colors::SUCCESS
        } else {
            Colors::FAILURE
        };
        let interrupted = if report.interrupted { ", interrupted" } else { "" };
        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!(
                "{} jobs, {} failed in {:.1?}{interrupted}\n",
                report.jobs.len(),
                failures,
                report.elapsed
            )),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::FAILURE),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

fn dependency_note(job: &crate::pipeline::JobSpec) -> String {
    let mut parts = Vec::new();
    if !job.wait_for.is_empty() {
        parts.push(format!("after {}", job.wait_for.join(",")));
    }
    if !job.if_success.is_empty() {
        parts.push(format!("if ok {}", job.if_success.join(",")));
    }
    if !job.if_failure.is_empty() {
        parts.push(format!("if failed {}", job.if_failure.join(",")));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("  [{}]", parts.join("; "))
    }
}

fn outcome_label(job: &JobReport) -> (&'static str, Color) {
    match job.outcome {
        Some(JobOutcome::Success) => ("ok", Colors::SUCCESS),
        Some(JobOutcome::Failure) => ("FAILED", Colors::FAILURE),
        None => ("UNKNOWN", Colors::PENDING),
    }
}

fn job_detail(job: &JobReport) -> String {
    match (&job.detail, job.outcome) {
        (Some(detail), _) => format!("{}: {detail}", job.command),
        (None, Some(JobOutcome::Success)) => "skipped (cancelled)".to_string(),
        (None, Some(JobOutcome::Failure)) => "skipped (dependency outcome not met)".to_string(),
        (None, None) => "never finalized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: Option<JobOutcome>, detail: Option<&str>) -> JobReport {
        JobReport {
            name: "build".into(),
            command: "cargo build".into(),
            outcome,
            detail: detail.map(str::to_string),
        }
    }

    #[test]
    fn detail_describes_skipped_jobs() {
        assert_eq!(
            job_detail(&report(Some(JobOutcome::Failure), None)),
            "skipped (dependency outcome not met)"
        );
        assert_eq!(
            job_detail(&report(Some(JobOutcome::Success), None)),
            "skipped (cancelled)"
        );
        assert_eq!(
            job_detail(&report(Some(JobOutcome::Success), Some("exit status: 0 after 1.0s"))),
            "cargo build: exit status: 0 after 1.0s"
        );
    }

    #[test]
    fn unknown_outcome_counts_as_failure() {
        assert!(report(None, None).failed());
        assert_eq!(outcome_label(&report(None, None)).0, "UNKNOWN");
    }

    #[test]
    fn dependency_note_lists_each_kind() {
        let pipeline = Pipeline::parse(
            r#"
[[job]]
name = "a"
command = "true"

[[job]]
name = "b"
command = "true"
wait_for = ["a"]
if_failure = ["a"]
"#,
        )
        .unwrap();
        assert_eq!(dependency_note(&pipeline.jobs[0]), "");
        assert_eq!(dependency_note(&pipeline.jobs[1]), "  [after a; if failed a]");
    }
}
