use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Completion;

/// Scheduler operational metrics.
///
/// Per-name maps hold at most `tracked_jobs` names; the name that first
/// entered the window is evicted first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Jobs accepted by `submit`.
    pub jobs_submitted: u64,
    /// Jobs moved from the queue to a worker.
    pub jobs_dispatched: u64,
    /// Finalized jobs by how they finished.
    pub completions: HashMap<Completion, u64>,
    /// Jobs waiting in the queue (filled at snapshot time).
    pub queue_depth: usize,
    /// Dispatched jobs holding a slot (filled at snapshot time).
    pub in_flight: usize,
    /// Configured concurrency ceiling.
    pub concurrency_limit: usize,
    /// `in_flight / concurrency_limit` (0.0 - 1.0).
    pub utilization: f64,
    /// Body executions by job name.
    pub executions: HashMap<String, u64>,
    /// Average body duration by job name.
    pub avg_body_duration: HashMap<String, Duration>,
    /// Last finalization time by job name.
    pub last_finished: HashMap<String, DateTime<Utc>>,
    #[serde(skip)]
    tracked: VecDeque<String>,
    #[serde(skip)]
    tracked_capacity: usize,
}

impl SchedulerMetrics {
    pub(crate) fn new(concurrency_limit: usize, tracked_jobs: usize) -> Self {
        Self {
            concurrency_limit,
            tracked_capacity: tracked_jobs,
            ..Self::default()
        }
    }

    pub(crate) fn record_submission(&mut self) {
        self.jobs_submitted += 1;
    }

    pub(crate) fn record_dispatch(&mut self) {
        self.jobs_dispatched += 1;
    }

    /// Record a finalized job. `body_duration` is set only if the body ran.
    pub(crate) fn record_completion(
        &mut self,
        job_name: &str,
        completion: Completion,
        body_duration: Option<Duration>,
    ) {
        *self.completions.entry(completion).or_default() += 1;
        if !self.track(job_name) {
            return;
        }
        self.last_finished.insert(job_name.to_string(), Utc::now());

        let Some(duration) = body_duration else {
            return;
        };

        *self.executions.entry(job_name.to_string()).or_default() += 1;
        let count = self.executions[job_name];
        let prev_avg = self
            .avg_body_duration
            .get(job_name)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_body_duration.insert(job_name.to_string(), new_avg);
    }

    /// Make room for `job_name` in the per-name maps. Returns false when
    /// per-name tracking is disabled.
    fn track(&mut self, job_name: &str) -> bool {
        if self.tracked_capacity == 0 {
            return false;
        }
        // Every tracked name has a `last_finished` entry.
        if self.last_finished.contains_key(job_name) {
            return true;
        }
        self.tracked.push_back(job_name.to_string());
        if self.tracked.len() > self.tracked_capacity {
            if let Some(evicted) = self.tracked.pop_front() {
                self.executions.remove(&evicted);
                self.avg_body_duration.remove(&evicted);
                self.last_finished.remove(&evicted);
            }
        }
        true
    }

    /// Number of jobs that finalized with the given completion.
    pub fn completed(&self, completion: Completion) -> u64 {
        self.completions.get(&completion).copied().unwrap_or(0)
    }

    /// Total finalized jobs.
    pub fn finalized(&self) -> u64 {
        self.completions.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = SchedulerMetrics::new(4, 16);
        m.record_completion("build", Completion::Succeeded, Some(Duration::from_millis(100)));

        assert_eq!(m.executions["build"], 1);
        assert!(m.last_finished.contains_key("build"));
        assert_eq!(m.avg_body_duration["build"], Duration::from_millis(100));
        assert_eq!(m.completed(Completion::Succeeded), 1);
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = SchedulerMetrics::new(4, 16);
        m.record_completion("job", Completion::Succeeded, Some(Duration::from_millis(100)));
        m.record_completion("job", Completion::Failed, Some(Duration::from_millis(200)));

        assert_eq!(m.executions["job"], 2);
        let avg = m.avg_body_duration["job"].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
        assert_eq!(m.finalized(), 2);
    }

    #[test]
    fn skipped_body_counts_completion_only() {
        let mut m = SchedulerMetrics::new(1, 16);
        m.record_completion("gated", Completion::GateViolated, None);

        assert_eq!(m.completed(Completion::GateViolated), 1);
        assert!(!m.executions.contains_key("gated"));
        assert!(m.last_finished.contains_key("gated"));
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::new(8, 16);
        assert_eq!(m.concurrency_limit, 8);
        assert_eq!(m.jobs_submitted, 0);
        assert_eq!(m.utilization, 0.0);
        assert_eq!(m.finalized(), 0);
    }

    #[test]
    fn per_name_maps_stay_within_capacity() {
        let mut m = SchedulerMetrics::new(4, 16);
        for i in 0..100 {
            let name = format!("job-{i}");
            m.record_completion(&name, Completion::Succeeded, Some(Duration::from_millis(1)));
        }

        assert_eq!(m.executions.len(), 16);
        assert_eq!(m.avg_body_duration.len(), 16);
        assert_eq!(m.last_finished.len(), 16);
        assert!(!m.last_finished.contains_key("job-0"));
        assert!(m.last_finished.contains_key("job-99"));
        assert_eq!(m.completed(Completion::Succeeded), 100);
    }

    #[test]
    fn repeated_name_keeps_its_slot() {
        let mut m = SchedulerMetrics::new(1, 2);
        m.record_completion("a", Completion::Succeeded, Some(Duration::from_millis(1)));
        m.record_completion("b", Completion::Succeeded, Some(Duration::from_millis(1)));
        m.record_completion("a", Completion::Failed, Some(Duration::from_millis(1)));
        assert_eq!(m.executions["a"], 2);

        m.record_completion("c", Completion::Succeeded, None);
        assert!(!m.last_finished.contains_key("a"));
        assert!(m.last_finished.contains_key("b"));
        assert!(m.last_finished.contains_key("c"));
    }

    #[test]
    fn zero_capacity_tracks_no_names() {
        let mut m = SchedulerMetrics::new(1, 0);
        m.record_completion("a", Completion::Succeeded, Some(Duration::from_millis(1)));
        assert!(m.executions.is_empty());
        assert!(m.last_finished.is_empty());
        assert_eq!(m.finalized(), 1);
    }
}
