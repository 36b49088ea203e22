use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::job::{Job, JobBody};
use crate::limiter::Slot;
use crate::registry::GateSignal;
use crate::types::{Completion, JobName};

use super::core::{Inner, JobDescriptor};

/// Lifecycle of one dispatched job: wait on dependencies, check gates and
/// cancellation, run the body, then fan out the result and release the slot.
pub(super) async fn run(inner: Arc<Inner>, descriptor: JobDescriptor, slot: Slot) {
    let JobDescriptor {
        job,
        options,
        mut completions,
        mut gates,
        ..
    } = descriptor;
    let Job { name, body, cancel } = job;

    let waited = tokio::select! {
        (_, violation) = async {
            tokio::join!(
                await_completions(&mut completions, options.wait_for.len()),
                await_gates(&mut gates, options.gate_count()),
            )
        } => Some(violation),
        _ = cancel.cancelled() => None,
    };

    let mut body_duration = None;
    let completion = match waited {
        None => {
            info!(job = %name, "job cancelled while waiting on dependencies");
            Completion::Cancelled
        }
        Some(Some(violation)) => {
            info!(
                job = %name,
                dependency = %violation.dependency,
                required = %violation.required,
                actual = %violation.actual,
                "dependency gate not met, skipping job"
            );
            Completion::GateViolated
        }
        Some(None) if cancel.is_cancelled() => {
            info!(job = %name, "job cancelled before execution");
            Completion::Cancelled
        }
        Some(None) => {
            let started = Instant::now();
            let completion = execute(&name, body, cancel).await;
            body_duration = Some(started.elapsed());
            completion
        }
    };

    finalize(&inner, &name, completion, body_duration, slot);
}

/// Count down one completion signal per `wait_for` dependency.
async fn await_completions(rx: &mut mpsc::UnboundedReceiver<JobName>, expected: usize) {
    for _ in 0..expected {
        match rx.recv().await {
            Some(dependency) => trace!(%dependency, "dependency finished"),
            None => return,
        }
    }
}

/// Collect one outcome per gated dependency. Returns the first violated gate.
async fn await_gates(
    rx: &mut mpsc::UnboundedReceiver<GateSignal>,
    expected: usize,
) -> Option<GateSignal> {
    let mut violation = None;
    for _ in 0..expected {
        let Some(signal) = rx.recv().await else {
            break;
        };
        if !signal.satisfied() && violation.is_none() {
            violation = Some(signal);
        }
    }
    violation
}

/// Run the body outside the scheduler lock. Panics are contained and
/// reported as [`Completion::Panicked`].
async fn execute(name: &str, body: JobBody, cancel: CancellationToken) -> Completion {
    debug!(job = %name, "running job");
    let result = match body {
        JobBody::Async(f) => AssertUnwindSafe(async move { f(cancel).await })
            .catch_unwind()
            .await
            .map_err(|payload| panic_message(&*payload)),
        JobBody::Blocking(f) => tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| e.to_string()),
    };

    match result {
        Ok(Ok(())) => Completion::Succeeded,
        Ok(Err(e)) => {
            let error = format!("{e:#}");
            warn!(job = %name, %error, "job failed");
            Completion::Failed
        }
        Err(panic) => {
            error!(job = %name, %panic, "job panicked");
            Completion::Panicked
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Fan the result out to every registered waiter, release the slot and wake
/// the dispatch loop. Registry update and release happen under the lock.
fn finalize(
    inner: &Inner,
    name: &str,
    completion: Completion,
    body_duration: Option<Duration>,
    slot: Slot,
) {
    let outcome = completion.outcome();
    {
        let mut state = inner.lock_state();
        let signalled = state.registry.finalize(name, outcome);
        state.metrics.record_completion(name, completion, body_duration);
        drop(slot);
        debug!(
            job = %name,
            %completion,
            %outcome,
            signalled,
            in_flight = inner.limiter.in_flight(),
            limit = inner.limiter.limit(),
            "job finalized"
        );
    }
    inner.tickle();
}
