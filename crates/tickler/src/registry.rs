//! Per-scheduler dependency bookkeeping.
//!
//! Maps job names to the waiters that must be signalled when a job with that
//! name finalizes, tracks which names are queued or running, and remembers a
//! bounded window of recent outcomes so a dependent that registers after its
//! dependency already finished still observes the result.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};

use crate::types::{JobName, JobOutcome};

// ── Signals ──────────────────────────────────────────────────────────

/// Outcome delivered to a job gated on one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GateSignal {
    pub dependency: JobName,
    pub required: JobOutcome,
    pub actual: JobOutcome,
}

impl GateSignal {
    pub fn satisfied(&self) -> bool {
        self.required == self.actual
    }
}

/// Released once when the named dependency finishes, whatever its outcome.
pub(crate) struct CompletionWaiter(mpsc::UnboundedSender<JobName>);

impl CompletionWaiter {
    pub fn new(tx: mpsc::UnboundedSender<JobName>) -> Self {
        Self(tx)
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn notify(self, name: &str) {
        // A closed receiver means the waiting worker is gone; nothing to release.
        let _ = self.0.send(name.to_string());
    }
}

/// Receives the outcome of the named dependency.
pub(crate) enum ResultWaiter {
    /// A job gated via `if_success` / `if_failure`.
    Gate {
        required: JobOutcome,
        tx: mpsc::UnboundedSender<GateSignal>,
    },
    /// An external observer (see `Scheduler::watch`).
    Watch(oneshot::Sender<JobOutcome>),
}

impl ResultWaiter {
    pub fn gate(required: JobOutcome, tx: mpsc::UnboundedSender<GateSignal>) -> Self {
        ResultWaiter::Gate { required, tx }
    }

    /// The receiving worker or observer is gone.
    fn is_closed(&self) -> bool {
        match self {
            ResultWaiter::Gate { tx, .. } => tx.is_closed(),
            ResultWaiter::Watch(tx) => tx.is_closed(),
        }
    }

    fn notify(self, name: &str, outcome: JobOutcome) {
        match self {
            ResultWaiter::Gate { required, tx } => {
                let _ = tx.send(GateSignal {
                    dependency: name.to_string(),
                    required,
                    actual: outcome,
                });
            }
            ResultWaiter::Watch(tx) => {
                let _ = tx.send(outcome);
            }
        }
    }
}

// ── Retained outcomes ────────────────────────────────────────────────

/// Bounded FIFO of recently finalized outcomes, last result per name.
#[derive(Debug)]
struct RetainedResults {
    capacity: usize,
    order: VecDeque<JobName>,
    outcomes: HashMap<JobName, JobOutcome>,
}

impl RetainedResults {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            outcomes: HashMap::new(),
        }
    }

    fn record(&mut self, name: &str, outcome: JobOutcome) {
        if self.capacity == 0 {
            return;
        }
        // Re-finalizing a name keeps its original eviction position.
        if self.outcomes.insert(name.to_string(), outcome).is_some() {
            return;
        }
        self.order.push_back(name.to_string());
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.outcomes.remove(&evicted);
            }
        }
    }

    fn get(&self, name: &str) -> Option<JobOutcome> {
        self.outcomes.get(name).copied()
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Waiter lists keyed by the job name they wait on.
///
/// Not synchronized: the scheduler mutates it only under its own lock.
pub(crate) struct DependencyRegistry {
    waiters: HashMap<JobName, Vec<CompletionWaiter>>,
    result_waiters: HashMap<JobName, Vec<ResultWaiter>>,
    /// Queued or running jobs per name. Duplicates are legal.
    active: HashMap<JobName, usize>,
    retained: RetainedResults,
}

impl DependencyRegistry {
    pub fn new(retained_results: usize) -> Self {
        Self {
            waiters: HashMap::new(),
            result_waiters: HashMap::new(),
            active: HashMap::new(),
            retained: RetainedResults::new(retained_results),
        }
    }

    /// Mark a job name as queued.
    pub fn activate(&mut self, name: &str) {
        *self.active.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Last retained outcome for `name`, if any.
    pub fn outcome(&self, name: &str) -> Option<JobOutcome> {
        self.retained.get(name)
    }

    /// Outcome to deliver immediately instead of registering, if `dependency`
    /// is idle and has already finalized.
    fn settled(&self, dependency: &str) -> Option<JobOutcome> {
        if self.is_active(dependency) {
            None
        } else {
            self.retained.get(dependency)
        }
    }

    pub fn register_completion(&mut self, dependency: &str, waiter: CompletionWaiter) {
        if self.settled(dependency).is_some() {
            waiter.notify(dependency);
            return;
        }
        let waiters = self.waiters.entry(dependency.to_string()).or_default();
        prune_before_growth(waiters, CompletionWaiter::is_closed);
        waiters.push(waiter);
    }

    pub fn register_result(&mut self, dependency: &str, waiter: ResultWaiter) {
        if let Some(outcome) = self.settled(dependency) {
            waiter.notify(dependency, outcome);
            return;
        }
        let waiters = self.result_waiters.entry(dependency.to_string()).or_default();
        prune_before_growth(waiters, ResultWaiter::is_closed);
        waiters.push(waiter);
    }

    /// Signal every waiter registered on `name`, then forget them.
    ///
    /// Returns how many waiters were signalled.
    pub fn finalize(&mut self, name: &str, outcome: JobOutcome) -> usize {
        let mut signalled = 0;

        if let Some(waiters) = self.waiters.remove(name) {
            signalled += waiters.len();
            for waiter in waiters {
                waiter.notify(name);
            }
        }

        if let Some(waiters) = self.result_waiters.remove(name) {
            signalled += waiters.len();
            for waiter in waiters {
                waiter.notify(name, outcome);
            }
        }

        if let Some(count) = self.active.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(name);
            }
        }

        self.retained.record(name, outcome);
        signalled
    }

    /// Number of waiters currently registered on `name`.
    #[cfg(test)]
    pub fn waiting_on(&self, name: &str) -> usize {
        self.waiters.get(name).map_or(0, Vec::len)
            + self.result_waiters.get(name).map_or(0, Vec::len)
    }
}

/// Drop waiters whose receiver is gone, but only when the list is about to
/// reallocate. Reserving twice the survivors keeps the sweep amortized O(1)
/// per registration.
fn prune_before_growth<W>(waiters: &mut Vec<W>, is_closed: fn(&W) -> bool) {
    if waiters.len() < waiters.capacity() {
        return;
    }
    waiters.retain(|w| !is_closed(w));
    waiters.reserve(waiters.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> (CompletionWaiter, mpsc::UnboundedReceiver<JobName>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CompletionWaiter::new(tx), rx)
    }

    fn gate(required: JobOutcome) -> (ResultWaiter, mpsc::UnboundedReceiver<GateSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResultWaiter::gate(required, tx), rx)
    }

    #[test]
    fn finalize_signals_each_waiter_once_and_clears() {
        let mut registry = DependencyRegistry::new(16);
        registry.activate("a");

        let (w1, mut rx1) = completion();
        let (w2, mut rx2) = completion();
        let (g, mut grx) = gate(JobOutcome::Success);
        registry.register_completion("a", w1);
        registry.register_completion("a", w2);
        registry.register_result("a", g);
        assert_eq!(registry.waiting_on("a"), 3);

        assert_eq!(registry.finalize("a", JobOutcome::Failure), 3);
        assert_eq!(registry.waiting_on("a"), 0);
        assert!(!registry.is_active("a"));

        assert_eq!(rx1.try_recv().unwrap(), "a");
        assert_eq!(rx2.try_recv().unwrap(), "a");
        assert!(rx1.try_recv().is_err());

        let signal = grx.try_recv().unwrap();
        assert_eq!(signal.actual, JobOutcome::Failure);
        assert!(!signal.satisfied());

        // Nothing left to signal on a second finalization.
        assert_eq!(registry.finalize("a", JobOutcome::Success), 0);
    }

    #[test]
    fn late_registration_sees_retained_outcome() {
        let mut registry = DependencyRegistry::new(16);
        registry.activate("a");
        registry.finalize("a", JobOutcome::Success);

        let (w, mut rx) = completion();
        registry.register_completion("a", w);
        assert_eq!(rx.try_recv().unwrap(), "a");

        let (g, mut grx) = gate(JobOutcome::Failure);
        registry.register_result("a", g);
        let signal = grx.try_recv().unwrap();
        assert_eq!(signal.dependency, "a");
        assert!(!signal.satisfied());

        let (tx, mut orx) = oneshot::channel();
        registry.register_result("a", ResultWaiter::Watch(tx));
        assert_eq!(orx.try_recv().unwrap(), JobOutcome::Success);

        assert_eq!(registry.waiting_on("a"), 0);
    }

    #[test]
    fn active_name_waits_for_next_run_not_retained() {
        let mut registry = DependencyRegistry::new(16);
        registry.activate("a");
        registry.finalize("a", JobOutcome::Failure);

        // Resubmitted: dependents wait for the new run.
        registry.activate("a");
        let (g, mut grx) = gate(JobOutcome::Success);
        registry.register_result("a", g);
        assert!(grx.try_recv().is_err());

        registry.finalize("a", JobOutcome::Success);
        assert!(grx.try_recv().unwrap().satisfied());
        assert_eq!(registry.outcome("a"), Some(JobOutcome::Success));
    }

    #[test]
    fn unknown_name_registers_and_waits() {
        let mut registry = DependencyRegistry::new(16);
        let (w, mut rx) = completion();
        registry.register_completion("ghost", w);
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.waiting_on("ghost"), 1);
    }

    #[test]
    fn duplicate_names_stay_active_until_last_finalizes() {
        let mut registry = DependencyRegistry::new(16);
        registry.activate("dup");
        registry.activate("dup");

        registry.finalize("dup", JobOutcome::Success);
        assert!(registry.is_active("dup"));
        registry.finalize("dup", JobOutcome::Success);
        assert!(!registry.is_active("dup"));
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut registry = DependencyRegistry::new(0);
        registry.activate("a");
        registry.finalize("a", JobOutcome::Success);
        assert_eq!(registry.outcome("a"), None);

        let (w, mut rx) = completion();
        registry.register_completion("a", w);
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.waiting_on("a"), 1);
    }

    #[test]
    fn retained_table_evicts_oldest() {
        let mut retained = RetainedResults::new(2);
        retained.record("a", JobOutcome::Success);
        retained.record("b", JobOutcome::Failure);
        retained.record("a", JobOutcome::Failure);
        assert_eq!(retained.get("a"), Some(JobOutcome::Failure));

        retained.record("c", JobOutcome::Success);
        assert_eq!(retained.get("a"), None);
        assert_eq!(retained.get("b"), Some(JobOutcome::Failure));
        assert_eq!(retained.get("c"), Some(JobOutcome::Success));
    }

    #[test]
    fn abandoned_waiters_pruned_on_later_registration() {
        let mut registry = DependencyRegistry::new(16);
        registry.activate("slow");

        // A dependent cancelled while waiting and a watch that timed out.
        let (dead, dead_rx) = completion();
        registry.register_completion("slow", dead);
        drop(dead_rx);
        let (tx, watch_rx) = oneshot::channel();
        registry.register_result("slow", ResultWaiter::Watch(tx));
        drop(watch_rx);

        let mut live = Vec::new();
        let mut live_gates = Vec::new();
        for _ in 0..16 {
            let (w, rx) = completion();
            registry.register_completion("slow", w);
            live.push(rx);
            let (g, grx) = gate(JobOutcome::Success);
            registry.register_result("slow", g);
            live_gates.push(grx);
        }

        assert_eq!(registry.waiting_on("slow"), 16 + 16);
        assert_eq!(registry.finalize("slow", JobOutcome::Success), 32);
        for mut rx in live {
            assert_eq!(rx.try_recv().unwrap(), "slow");
        }
        for mut grx in live_gates {
            assert!(grx.try_recv().unwrap().satisfied());
        }
    }
}
