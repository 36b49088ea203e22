use std::sync::Arc;

use tracing::{debug, info, trace};

use super::core::Inner;
use super::worker;

impl Inner {
    /// Main dispatch loop. Idles until woken, then drains the queue while the
    /// limiter has room. Exits when the scheduler is stopped.
    pub(super) async fn dispatch_loop(self: Arc<Self>) {
        info!(limit = self.limiter.limit(), "dispatch loop started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    let abandoned = self.lock_state().queue.len();
                    info!(abandoned, "dispatch loop stopped");
                    return;
                }
                _ = self.wake.notified() => self.drain(),
            }
        }
    }

    /// Move jobs from the queue to workers, FIFO, until the queue is empty or
    /// every slot is taken. A full limiter is not an error: the remaining
    /// jobs stay queued until a worker releases its slot and wakes the loop.
    fn drain(self: &Arc<Self>) {
        let mut state = self.lock_state();
        while !state.queue.is_empty() && !self.shutdown.is_cancelled() {
            let Some(slot) = self.limiter.try_acquire() else {
                trace!(
                    queued = state.queue.len(),
                    limit = self.limiter.limit(),
                    "concurrency limit reached, deferring"
                );
                break;
            };
            let Some(descriptor) = state.queue.pop_front() else {
                break;
            };

            state.metrics.record_dispatch();
            debug!(
                job = %descriptor.job.name,
                queued = state.queue.len(),
                in_flight = self.limiter.in_flight(),
                waited = ?descriptor.submitted_at.elapsed(),
                "job dispatched"
            );
            tokio::spawn(worker::run(Arc::clone(self), descriptor, slot));
        }
    }
}
