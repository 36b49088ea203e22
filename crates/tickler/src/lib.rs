//! `tickler` -- in-process job scheduler with a concurrency ceiling and
//! name-based dependencies.
//!
//! Jobs are submitted under a name and may declare three kinds of
//! dependency on other names:
//!
//! | Option       | Behaviour                                                     |
//! |--------------|---------------------------------------------------------------|
//! | `wait_for`   | Run after each named job finished, whatever its outcome       |
//! | `if_success` | Fail without running unless each named job succeeded          |
//! | `if_failure` | Fail without running unless each named job failed             |
//!
//! A single dispatch loop moves queued jobs (FIFO) to workers while fewer than
//! `concurrency_limit` jobs are in flight. Each worker waits on its
//! dependencies, evaluates gates and cancellation, runs the body and then
//! signals every job waiting on its name.
//!
//! ```ignore
//! let scheduler = Scheduler::with_limit(4)?;
//! scheduler.start();
//! scheduler.submit(Job::new("fetch", async { fetch().await }), JobOptions::new())?;
//! scheduler.submit(
//!     Job::new("index", async { index().await }),
//!     JobOptions::new().if_success(["fetch"]),
//! )?;
//! assert_eq!(scheduler.wait_for("index").await, Some(JobOutcome::Success));
//! ```

pub mod config;
pub mod error;
pub mod job;
mod limiter;
pub mod metrics;
mod registry;
pub mod scheduler;
pub mod types;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use job::{BodyFuture, Job, JobOptions};
pub use metrics::SchedulerMetrics;
pub use scheduler::Scheduler;
pub use tokio_util::sync::CancellationToken;
pub use types::{Completion, JobName, JobOutcome};
