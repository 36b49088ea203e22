use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::types::JobName;

/// Boxed future returned by an async job body.
pub type BodyFuture = BoxFuture<'static, anyhow::Result<()>>;

pub(crate) enum JobBody {
    Async(Box<dyn FnOnce(CancellationToken) -> BodyFuture + Send>),
    Blocking(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
}

/// A named unit of work with its cancellation token.
///
/// The token is checked once right before the body runs (and while the job
/// waits on its dependencies). A body that has started always runs to
/// completion unless it watches the token itself, see [`Job::with_context`].
pub struct Job {
    pub(crate) name: JobName,
    pub(crate) body: JobBody,
    pub(crate) cancel: CancellationToken,
}

impl Job {
    /// Job whose body is a ready-made future.
    ///
    /// ```ignore
    /// let job = Job::new("vacuum", async move { db.vacuum().await });
    /// ```
    pub fn new<F>(name: impl Into<JobName>, body: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: JobBody::Async(Box::new(move |_| body.boxed())),
            cancel: CancellationToken::new(),
        }
    }

    /// Job whose body receives its own cancellation token.
    pub fn with_context<F, Fut>(name: impl Into<JobName>, cancel: CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: JobBody::Async(Box::new(move |token| body(token).boxed())),
            cancel,
        }
    }

    /// Job with a synchronous body, run on the blocking thread pool.
    pub fn blocking<F>(name: impl Into<JobName>, body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: JobBody::Blocking(Box::new(body)),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the job's cancellation token.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token checked before the body runs.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            JobBody::Async(_) => "async",
            JobBody::Blocking(_) => "blocking",
        };
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("body", &kind)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Dependency declarations attached to a submitted job.
///
/// - `wait_for`: run only after each named job has finished, whatever its outcome.
/// - `if_success`: every named job must finish with success, otherwise this job
///   fails without running.
/// - `if_failure`: every named job must finish with failure, otherwise this job
///   fails without running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub wait_for: BTreeSet<JobName>,
    #[serde(default)]
    pub if_success: BTreeSet<JobName>,
    #[serde(default)]
    pub if_failure: BTreeSet<JobName>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_for<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<JobName>,
    {
        self.wait_for.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn if_success<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<JobName>,
    {
        self.if_success.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn if_failure<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<JobName>,
    {
        self.if_failure.extend(names.into_iter().map(Into::into));
        self
    }

    /// Number of outcome signals the job must collect before it may run.
    pub fn gate_count(&self) -> usize {
        self.if_success.len() + self.if_failure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wait_for.is_empty() && self.gate_count() == 0
    }

    /// Whether `name` appears in any declaration.
    pub fn references(&self, name: &str) -> bool {
        self.wait_for.contains(name) || self.if_success.contains(name) || self.if_failure.contains(name)
    }

    /// Every distinct job name this job depends on.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.wait_for
            .iter()
            .chain(&self.if_success)
            .chain(&self.if_failure)
            .map(String::as_str)
            .collect()
    }
}
