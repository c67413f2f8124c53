//! Capability error types.

use thiserror::Error;

/// Errors raised by the capability layer itself, as opposed to a capability
/// being unavailable.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A provider dropped its [`Completion`](crate::Completion) without
    /// reporting a status.
    #[error("provider dropped its completion without reporting a status")]
    CompletionDropped,

    /// A provider reported a failure of its own.
    #[error("provider failure: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, Error>;
