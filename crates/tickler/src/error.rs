use thiserror::Error;

/// Errors surfaced by the scheduler to its callers.
///
/// Job failures are never reported here; they are recorded as the job's
/// outcome and observed through dependents or [`crate::Scheduler::watch`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The submitted job is malformed (e.g. empty name).
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A job declared itself as one of its own dependencies.
    #[error("job {name} depends on itself")]
    SelfDependency { name: String },

    /// Configuration values are out of range.
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
