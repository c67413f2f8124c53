use super::{CAPABILITY_ERROR, Condition, ConditionError, Verdict};
use crate::authorize::AuthorizeCapability;
use crate::coordinator::{ProviderOp, provider_status};
use crate::task::{Task, TaskHandle};
use async_trait::async_trait;
use capability::{CapabilityError, CapabilityProvider};
use context::ErrorContext;
use std::sync::Arc;
use tracing::debug;

/// Requires a capability to be authorized, optionally requesting it first.
///
/// When requesting, the condition injects an [`AuthorizeCapability`]
/// dependency. Evaluation itself only checks the status; it never prompts.
pub struct CapabilityCondition<P: ?Sized> {
    provider: Arc<P>,
    request_if_necessary: bool,
}

impl<P: CapabilityProvider + ?Sized> CapabilityCondition<P> {
    /// Check the capability and request it if it was never asked for.
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_request(provider, true)
    }

    /// Only check the capability.
    pub fn check(provider: Arc<P>) -> Self {
        Self::with_request(provider, false)
    }

    pub fn with_request(provider: Arc<P>, request_if_necessary: bool) -> Self {
        Self {
            provider,
            request_if_necessary,
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}

#[async_trait]
impl<P: CapabilityProvider + ?Sized> Condition for CapabilityCondition<P> {
    fn name(&self) -> String {
        format!("Capability<{}>", self.provider.name())
    }

    fn is_mutually_exclusive(&self) -> bool {
        true
    }

    fn dependency(&self, _task: &TaskHandle) -> Option<Arc<dyn Task>> {
        if !self.request_if_necessary {
            return None;
        }
        let provider = Arc::clone(&self.provider);
        Some(Arc::new(AuthorizeCapability::new(provider)))
    }

    async fn evaluate(&self, task: &TaskHandle) -> Verdict {
        let coordinator = task.coordinator();
        let status = provider_status(coordinator, &self.provider, ProviderOp::RequestStatus).await;
        debug!(
            task = %task.name(),
            capability = self.provider.name(),
            %status,
            "capability evaluated"
        );

        match CapabilityError::from_status(self.provider.name(), &status) {
            None => Verdict::Satisfied,
            Some(error) => Verdict::Failed(ConditionError::with_context(
                self.name(),
                ErrorContext::with(CAPABILITY_ERROR, error),
            )),
        }
    }
}
