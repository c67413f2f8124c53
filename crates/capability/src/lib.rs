//! Capability status model and provider contract.
//!
//! A capability is an external permission or resource (location, calendar,
//! push registration, a cloud account) whose authorization state can be
//! queried and requested asynchronously.
//!
//! - [`CapabilityStatus`] is what a provider reports.
//! - [`CapabilityError`] is derived from any status other than `Authorized`,
//!   via [`CapabilityStatus::error_reason`].
//! - [`CapabilityProvider`] is the two-operation contract a backend implements,
//!   each operation answering through an exactly-once [`Completion`].

mod capability;
mod completion;
mod error;
mod provider;
mod scripted;

pub use capability::{CapabilityError, CapabilityStatus, ProviderError, Reason};
pub use completion::{Completion, Pending};
pub use error::{Error, Result};
pub use provider::CapabilityProvider;
pub use scripted::{ProviderCall, ScriptedProvider, ScriptedStatus};
