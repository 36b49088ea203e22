use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::job::{Job, JobOptions};
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::SchedulerMetrics;
use crate::registry::{CompletionWaiter, DependencyRegistry, GateSignal, ResultWaiter};
use crate::types::{JobName, JobOutcome};

/// A job accepted by `submit` together with the receiving ends of its
/// dependency signals. The sending ends live in the registry.
pub(super) struct JobDescriptor {
    pub(super) job: Job,
    pub(super) options: JobOptions,
    pub(super) completions: mpsc::UnboundedReceiver<JobName>,
    pub(super) gates: mpsc::UnboundedReceiver<GateSignal>,
    pub(super) submitted_at: Instant,
}

/// Everything guarded by the scheduler lock.
pub(super) struct EngineState {
    pub(super) queue: VecDeque<JobDescriptor>,
    pub(super) registry: DependencyRegistry,
    pub(super) metrics: SchedulerMetrics,
}

pub(super) struct Inner {
    pub(super) config: SchedulerConfig,
    pub(super) state: Mutex<EngineState>,
    pub(super) limiter: ConcurrencyLimiter,
    /// Coalescing doorbell for the dispatch loop: `notify_one` stores at most
    /// one pending wake.
    pub(super) wake: Notify,
    pub(super) shutdown: CancellationToken,
    pub(super) started: AtomicBool,
}

impl Inner {
    pub(super) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // Bookkeeping sections never panic halfway, so a poisoned lock still
        // holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn tickle(&self) {
        self.wake.notify_one();
    }
}

/// In-process job scheduler with a global concurrency ceiling and
/// name-based dependencies between jobs.
///
/// Cloning yields another handle to the same scheduler. Dropping the last
/// handle stops it, as [`Scheduler::stop`] does; workers already dispatched
/// still run to finalization.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) inner: Arc<Inner>,
    _stop_on_drop: Arc<DropGuard>,
}

impl Scheduler {
    /// Create a scheduler. Call [`Scheduler::start`] to begin dispatching.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let limit = config.concurrency_limit;
        let shutdown = CancellationToken::new();
        Ok(Self {
            _stop_on_drop: Arc::new(shutdown.clone().drop_guard()),
            inner: Arc::new(Inner {
                state: Mutex::new(EngineState {
                    queue: VecDeque::new(),
                    registry: DependencyRegistry::new(config.retained_results),
                    metrics: SchedulerMetrics::new(limit, config.tracked_jobs),
                }),
                limiter: ConcurrencyLimiter::new(limit),
                wake: Notify::new(),
                shutdown,
                started: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Scheduler with default settings and the given concurrency ceiling.
    pub fn with_limit(concurrency_limit: usize) -> Result<Self> {
        Self::new(SchedulerConfig::with_limit(concurrency_limit))
    }

    /// Spawn the dispatch loop on the current Tokio runtime.
    ///
    /// Jobs submitted before this call stay queued until it is made.
    /// Subsequent calls do nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(Arc::clone(&self.inner).dispatch_loop());
    }

    /// Stop dispatching. Running jobs finish and finalize normally; queued
    /// jobs are never dispatched. Repeated calls have no further effect.
    pub fn stop(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!("scheduler shutdown requested");
        self.inner.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Accept a job for dispatch.
    ///
    /// Dependencies are registered before the job is queued, so a dependency
    /// finishing concurrently cannot miss it. Names are not checked against
    /// submitted jobs: a dependency on a name that never runs blocks this job
    /// until its token is cancelled.
    pub fn submit(&self, job: Job, options: JobOptions) -> Result<()> {
        if job.name.trim().is_empty() {
            return Err(SchedulerError::InvalidJob("job name must not be empty".into()));
        }
        if options.references(&job.name) {
            return Err(SchedulerError::SelfDependency { name: job.name });
        }
        if self.is_stopped() {
            warn!(job = %job.name, "scheduler stopped; job will not be dispatched");
        }

        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (gate_tx, gates) = mpsc::unbounded_channel();

        {
            let mut state = self.inner.lock_state();
            state.registry.activate(&job.name);

            for dependency in &options.wait_for {
                state
                    .registry
                    .register_completion(dependency, CompletionWaiter::new(completion_tx.clone()));
            }
            for dependency in &options.if_success {
                state
                    .registry
                    .register_result(dependency, ResultWaiter::gate(JobOutcome::Success, gate_tx.clone()));
            }
            for dependency in &options.if_failure {
                state
                    .registry
                    .register_result(dependency, ResultWaiter::gate(JobOutcome::Failure, gate_tx.clone()));
            }

            state.metrics.record_submission();
            debug!(job = %job.name, queued = state.queue.len() + 1, "job enqueued");
            state.queue.push_back(JobDescriptor {
                job,
                options,
                completions,
                gates,
                submitted_at: Instant::now(),
            });
        }

        self.inner.tickle();
        Ok(())
    }

    /// Observe the next finalization of `name`.
    ///
    /// Registration happens before this returns; if `name` is idle and its
    /// outcome is still retained the future resolves immediately. Resolves to
    /// `None` once the scheduler is torn down without `name` finalizing: every
    /// handle dropped and every dispatched job finished.
    pub fn watch(&self, name: &str) -> impl Future<Output = Option<JobOutcome>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock_state()
            .registry
            .register_result(name, ResultWaiter::Watch(tx));
        async move { rx.await.ok() }
    }

    /// Wait for the next finalization of `name`. See [`Scheduler::watch`].
    pub async fn wait_for(&self, name: &str) -> Option<JobOutcome> {
        self.watch(name).await
    }

    /// Last retained outcome of `name`, without waiting.
    pub fn outcome(&self, name: &str) -> Option<JobOutcome> {
        self.inner.lock_state().registry.outcome(name)
    }

    /// Whether a job named `name` is queued or running.
    pub fn is_active(&self, name: &str) -> bool {
        self.inner.lock_state().registry.is_active(name)
    }

    /// Jobs accepted but not yet dispatched.
    pub fn queued(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Dispatched jobs that have not finalized.
    pub fn in_flight(&self) -> usize {
        self.inner.limiter.in_flight()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let state = self.inner.lock_state();
        let mut metrics = state.metrics.clone();
        metrics.queue_depth = state.queue.len();
        metrics.in_flight = self.inner.limiter.in_flight();
        metrics.utilization = metrics.in_flight as f64 / self.inner.limiter.limit() as f64;
        metrics
    }
}
