//! Capability provider contract.

use crate::{CapabilityStatus, Completion};

/// An external permission or resource whose authorization state can be
/// queried and requested.
///
/// Both operations are asynchronous in callback form: they must return
/// promptly and invoke their completion exactly once, from any thread.
/// Callers only invoke them from the coordination context, so providers need
/// no internal locking around state shared with other calls.
pub trait CapabilityProvider: Send + Sync + 'static {
    /// Name of the capability kind.
    ///
    /// Every instance of one kind reports the same name; authorization of a
    /// kind is serialized on it.
    fn name(&self) -> &str;

    /// Report the current status without prompting.
    fn request_status(&self, completion: Completion<CapabilityStatus>);

    /// Ask for authorization. Only called while the status is
    /// [`CapabilityStatus::NotDetermined`].
    fn authorize(&self, completion: Completion<CapabilityStatus>);
}
