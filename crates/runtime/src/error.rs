use crate::condition::ConditionError;
use crate::timeout::TimeoutError;
use capability::CapabilityError;
use thiserror::Error;

/// Engine infrastructure errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The coordination context is no longer accepting work.
    #[error("coordination context closed")]
    CoordinatorClosed,

    /// The engine configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Capability(#[from] capability::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a task was cancelled or finished unsuccessfully.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// A condition gating the task was not satisfied.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// An authorization dependency ended without the capability.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The task exceeded its deadline.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The task's own work failed.
    #[error("task failed: {0}")]
    Failed(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
