use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied job identity. Uniqueness is advisory, not enforced.
pub type JobName = String;

/// Final result of a job, as seen by its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failure,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Success => "success",
            JobOutcome::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

/// How a job reached its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The body ran and returned `Ok`.
    Succeeded,
    /// The body ran and returned an error.
    Failed,
    /// A success/failure precondition was not met; the body never ran.
    GateViolated,
    /// The job's token was cancelled before the body ran.
    Cancelled,
    /// The body panicked.
    Panicked,
}

impl Completion {
    /// Outcome reported to dependents.
    ///
    /// Cancellation counts as success: there is nothing to report.
    pub fn outcome(self) -> JobOutcome {
        match self {
            Completion::Succeeded | Completion::Cancelled => JobOutcome::Success,
            Completion::Failed | Completion::GateViolated | Completion::Panicked => {
                JobOutcome::Failure
            }
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Completion::Succeeded => "succeeded",
            Completion::Failed => "failed",
            Completion::GateViolated => "gate_violated",
            Completion::Cancelled => "cancelled",
            Completion::Panicked => "panicked",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_outcomes() {
        assert_eq!(Completion::Succeeded.outcome(), JobOutcome::Success);
        assert_eq!(Completion::Cancelled.outcome(), JobOutcome::Success);
        assert_eq!(Completion::Failed.outcome(), JobOutcome::Failure);
        assert_eq!(Completion::GateViolated.outcome(), JobOutcome::Failure);
        assert_eq!(Completion::Panicked.outcome(), JobOutcome::Failure);
    }

    #[test]
    fn serde_names() {
        assert_eq!(serde_json::to_string(&JobOutcome::Failure).unwrap(), "\"failure\"");
        assert_eq!(
            serde_json::to_string(&Completion::GateViolated).unwrap(),
            "\"gate_violated\""
        );
        assert_eq!(Completion::GateViolated.to_string(), "gate_violated");
    }
}
