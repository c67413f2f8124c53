//! Capability status and the errors derived from it.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Opaque error reported by a capability provider.
pub type ProviderError = Arc<dyn std::error::Error + Send + Sync>;

/// The authorization state of a capability.
///
/// Equality is shallow for [`CapabilityStatus::Error`]: any two error
/// statuses compare equal regardless of payload.
#[derive(Debug, Clone)]
pub enum CapabilityStatus {
    /// The capability has not been requested yet.
    NotDetermined,
    /// The capability has been requested and approved.
    Authorized,
    /// The capability has been requested but was denied by the user.
    Denied,
    /// The capability is not available (restrictions, lack of support).
    NotAvailable,
    /// The provider failed while determining the status.
    Error(ProviderError),
}

impl CapabilityStatus {
    /// Wrap a provider failure.
    pub fn error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Error(Arc::new(error))
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }

    /// Why this status is a failure, or `None` when it is `Authorized`.
    ///
    /// This is the only place a status is turned into a failure reason.
    pub fn error_reason(&self) -> Option<Reason> {
        match self {
            Self::NotDetermined => Some(Reason::NotDetermined),
            Self::Denied => Some(Reason::Denied),
            Self::NotAvailable => Some(Reason::NotAvailable),
            Self::Error(error) => Some(Reason::Failed(Arc::clone(error))),
            Self::Authorized => None,
        }
    }
}

impl PartialEq for CapabilityStatus {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::NotDetermined, Self::NotDetermined)
                | (Self::Authorized, Self::Authorized)
                | (Self::Denied, Self::Denied)
                | (Self::NotAvailable, Self::NotAvailable)
                | (Self::Error(_), Self::Error(_))
        )
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetermined => f.write_str("not determined"),
            Self::Authorized => f.write_str("authorized"),
            Self::Denied => f.write_str("denied"),
            Self::NotAvailable => f.write_str("not available"),
            Self::Error(error) => write!(f, "error ({error})"),
        }
    }
}

/// Why a capability is not usable.
#[derive(Debug, Clone)]
pub enum Reason {
    /// Authorization has not been asked for yet.
    NotDetermined,
    /// The capability cannot be provided on this system.
    NotAvailable,
    /// The user refused.
    Denied,
    /// The provider itself failed.
    Failed(ProviderError),
}

// Payloads of `Failed` are not compared.
impl PartialEq for Reason {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::NotDetermined, Self::NotDetermined)
                | (Self::NotAvailable, Self::NotAvailable)
                | (Self::Denied, Self::Denied)
                | (Self::Failed(_), Self::Failed(_))
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetermined => f.write_str("not determined"),
            Self::NotAvailable => f.write_str("not available"),
            Self::Denied => f.write_str("denied"),
            Self::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// A capability was not authorized.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("capability {capability_name} {reason}")]
pub struct CapabilityError {
    pub capability_name: String,
    pub reason: Reason,
}

impl CapabilityError {
    pub fn new(capability_name: impl Into<String>, reason: Reason) -> Self {
        Self {
            capability_name: capability_name.into(),
            reason,
        }
    }

    /// Derive the error for `status`, or `None` when it is `Authorized`.
    pub fn from_status(
        capability_name: impl Into<String>,
        status: &CapabilityStatus,
    ) -> Option<Self> {
        status
            .error_reason()
            .map(|reason| Self::new(capability_name, reason))
    }
}
