use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use tickler::{CancellationToken, Job, JobOutcome, Scheduler, SchedulerConfig};

use crate::pipeline::{JobSpec, Pipeline};

/// What the command body observed, keyed by job name. Jobs that never ran
/// have no entry.
#[derive(Clone, Default)]
struct Details(Arc<Mutex<HashMap<String, String>>>);

impl Details {
    fn record(&self, name: &str, detail: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), detail);
    }

    fn take(&self, name: &str) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).remove(name)
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub name: String,
    pub command: String,
    /// `None` if the scheduler went away before the job finalized.
    pub outcome: Option<JobOutcome>,
    /// Exit status or error from running the command; `None` if it never ran.
    pub detail: Option<String>,
}

impl JobReport {
    pub fn failed(&self) -> bool {
        self.outcome != Some(JobOutcome::Success)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.jobs.iter().filter(|job| job.failed()).count()
    }

    pub fn success(&self) -> bool {
        !self.interrupted && self.failures() == 0
    }
}

/// Submit every job of `pipeline` and wait until all of them finalized.
///
/// Ctrl-C cancels every job: running commands are killed and queued jobs
/// finalize without running.
pub async fn run_pipeline(pipeline: Pipeline, config: SchedulerConfig) -> Result<RunReport> {
    let started = Instant::now();
    let scheduler = Scheduler::new(config).context("invalid scheduler configuration")?;
    let root = CancellationToken::new();
    let details = Details::default();

    let commands: Vec<(String, String)> = pipeline
        .jobs
        .iter()
        .map(|spec| (spec.name.clone(), spec.command_line()))
        .collect();
    // Registered before submission so even the fastest job is observed.
    let watches: Vec<_> = pipeline
        .jobs
        .iter()
        .map(|spec| scheduler.watch(&spec.name))
        .collect();

    info!(
        jobs = pipeline.jobs.len(),
        limit = scheduler.config().concurrency_limit,
        "running pipeline"
    );
    scheduler.start();

    for spec in pipeline.jobs {
        let options = spec.options();
        let name = spec.name.clone();
        let details = details.clone();
        let job = Job::with_context(name, root.child_token(), move |cancel| async move {
            let result = run_command(&spec, cancel).await;
            let detail = match &result {
                Ok(status) => status.clone(),
                Err(e) => format!("{e:#}"),
            };
            details.record(&spec.name, detail);
            result.map(|_| ())
        });
        scheduler.submit(job, options)?;
    }

    let (outcomes, interrupted) = await_outcomes(
        futures::future::join_all(watches),
        tokio::signal::ctrl_c(),
        &root,
    )
    .await;
    scheduler.stop();

    let jobs = commands
        .into_iter()
        .zip(outcomes)
        .map(|((name, command), outcome)| JobReport {
            detail: details.take(&name),
            name,
            command,
            outcome,
        })
        .collect();

    Ok(RunReport {
        jobs,
        interrupted,
        elapsed: started.elapsed(),
    })
}

/// Wait for `all`. If `interrupt` fires first, cancel `root` and keep
/// waiting: cancelled jobs still finalize. A signal hookup that fails is
/// logged and otherwise ignored.
async fn await_outcomes<F, S>(all: F, interrupt: S, root: &CancellationToken) -> (F::Output, bool)
where
    F: Future,
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(all);
    tokio::select! {
        outcomes = &mut all => (outcomes, false),
        signal = interrupt => match signal {
            Ok(()) => {
                warn!("interrupted, cancelling all jobs");
                root.cancel();
                (all.await, true)
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for ctrl-c");
                (all.await, false)
            }
        },
    }
}

/// Spawn the job's command and wait for it, killing it if `cancel` fires.
/// Returns a short description of how it exited.
async fn run_command(spec: &JobSpec, cancel: CancellationToken) -> Result<String> {
    info!(job = %spec.name, command = %spec.command_line(), "starting command");
    let started = Instant::now();

    let mut child = Command::new(&spec.command)
        .args(&spec.args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", spec.command))?;

    let status = tokio::select! {
        status = child.wait() => status.with_context(|| format!("failed to wait on '{}'", spec.command))?,
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(job = %spec.name, error = %e, "failed to kill command");
            }
            bail!("killed after {:.1?}", started.elapsed());
        }
    };

    let elapsed = started.elapsed();
    if !status.success() {
        bail!("{status} after {elapsed:.1?}");
    }
    Ok(format!("{status} after {elapsed:.1?}"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use futures::future;

    fn pipeline(toml: &str) -> Pipeline {
        Pipeline::parse(toml).unwrap()
    }

    #[tokio::test]
    async fn runs_commands_and_gates_on_exit_status() {
        let report = run_pipeline(
            pipeline(
                r#"
[[job]]
name = "ok"
command = "true"

[[job]]
name = "broken"
command = "false"

[[job]]
name = "after-ok"
command = "true"
if_success = ["ok"]

[[job]]
name = "after-broken"
command = "true"
if_success = ["broken"]

[[job]]
name = "recover"
command = "true"
if_failure = ["broken"]
"#,
            ),
            SchedulerConfig::with_limit(2),
        )
        .await
        .unwrap();

        let outcome = |name: &str| {
            report
                .jobs
                .iter()
                .find(|job| job.name == name)
                .and_then(|job| job.outcome)
        };
        assert_eq!(outcome("ok"), Some(JobOutcome::Success));
        assert_eq!(outcome("broken"), Some(JobOutcome::Failure));
        assert_eq!(outcome("after-ok"), Some(JobOutcome::Success));
        assert_eq!(outcome("after-broken"), Some(JobOutcome::Failure));
        assert_eq!(outcome("recover"), Some(JobOutcome::Success));
        assert_eq!(report.failures(), 2);
        assert!(!report.success());

        let skipped = report.jobs.iter().find(|job| job.name == "after-broken").unwrap();
        assert!(skipped.detail.is_none());
    }

    #[tokio::test]
    async fn missing_binary_is_a_failure() {
        let report = run_pipeline(
            pipeline(
                r#"
[[job]]
name = "ghost"
command = "definitely-not-a-real-binary-tickler"
"#,
            ),
            SchedulerConfig::with_limit(1),
        )
        .await
        .unwrap();

        let job = &report.jobs[0];
        assert_eq!(job.outcome, Some(JobOutcome::Failure));
        assert!(job.detail.as_deref().unwrap().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn interrupt_cancels_jobs_and_keeps_waiting() {
        let root = CancellationToken::new();
        let token = root.clone();
        let all = async move {
            token.cancelled().await;
            "finalized"
        };

        let (outcome, interrupted) = await_outcomes(all, future::ready(Ok(())), &root).await;
        assert_eq!(outcome, "finalized");
        assert!(interrupted);
        assert!(root.is_cancelled());
    }

    #[tokio::test]
    async fn failed_signal_hookup_is_not_an_interrupt() {
        let root = CancellationToken::new();
        let all = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            "finalized"
        };
        let hookup_failed = future::ready(Err(std::io::Error::other("no signal handler")));

        let (outcome, interrupted) = await_outcomes(all, hookup_failed, &root).await;
        assert_eq!(outcome, "finalized");
        assert!(!interrupted);
        assert!(!root.is_cancelled());
    }
}
