//! One-shot capability authorization task.

use crate::TaskError;
use crate::coordinator::{ProviderOp, provider_status};
use crate::exclusion::ExclusionRegistry;
use crate::task::{Task, TaskHandle};
use async_trait::async_trait;
use capability::{CapabilityError, CapabilityProvider, CapabilityStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Progress of an [`AuthorizeCapability`] task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Created,
    Checking,
    Requesting,
    Finished,
}

/// Exclusion domain serializing authorization of one capability kind.
pub fn authorization_domain(capability_name: &str) -> String {
    format!("Authorize<{capability_name}>")
}

/// Drives a provider through status check, authorization if the status is
/// undetermined, and reports the resulting status.
///
/// At most one authorization task per capability kind is past `Created` and
/// before `Finished` at any time, process-wide.
pub struct AuthorizeCapability<P: ?Sized> {
    provider: Arc<P>,
    transitions: Mutex<Vec<AuthorizationState>>,
}

impl<P: CapabilityProvider + ?Sized> AuthorizeCapability<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            transitions: Mutex::new(vec![AuthorizationState::Created]),
        }
    }

    fn transitions_lock(&self) -> MutexGuard<'_, Vec<AuthorizationState>> {
        self.transitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> AuthorizationState {
        self.transitions_lock()
            .last()
            .copied()
            .unwrap_or(AuthorizationState::Created)
    }

    /// Every state entered so far, starting with `Created`.
    pub fn transitions(&self) -> Vec<AuthorizationState> {
        self.transitions_lock().clone()
    }

    fn enter(&self, state: AuthorizationState) {
        debug!(capability = self.provider.name(), ?state, "authorization state");
        self.transitions_lock().push(state);
    }

    async fn authorize(&self, task: &TaskHandle) -> CapabilityStatus {
        let coordinator = task.coordinator();

        self.enter(AuthorizationState::Checking);
        let status = provider_status(coordinator, &self.provider, ProviderOp::RequestStatus).await;
        if status != CapabilityStatus::NotDetermined {
            return status;
        }

        self.enter(AuthorizationState::Requesting);
        info!(capability = self.provider.name(), "requesting authorization");
        provider_status(coordinator, &self.provider, ProviderOp::Authorize).await
    }
}

#[async_trait]
impl<P: CapabilityProvider + ?Sized> Task for AuthorizeCapability<P> {
    fn name(&self) -> String {
        format!("AuthorizeCapability<{}>", self.provider.name())
    }

    async fn execute(&self, task: &TaskHandle) -> Result<(), TaskError> {
        let _domain = ExclusionRegistry::global()
            .acquire(&authorization_domain(self.provider.name()))
            .await;

        let status = self.authorize(task).await;
        self.enter(AuthorizationState::Finished);

        match CapabilityError::from_status(self.provider.name(), &status) {
            None => Ok(()),
            Some(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::task::run_task;
    use capability::{ProviderCall, Reason, ScriptedProvider};
    use std::time::Duration;
    use tokio::time::Instant;

    use AuthorizationState::*;

    fn host(name: &str, coordinator: &Coordinator) -> TaskHandle {
        TaskHandle::new(name, coordinator.clone())
    }

    #[tokio::test]
    async fn test_not_determined_requests_then_succeeds() {
        let coordinator = Coordinator::spawn();
        let provider = ScriptedProvider::new("auth-granted", CapabilityStatus::NotDetermined);
        let provider = Arc::new(provider);
        let authorize = AuthorizeCapability::new(Arc::clone(&provider));

        let result = authorize.execute(&host("dep", &coordinator)).await;

        assert_eq!(result, Ok(()));
        assert_eq!(
            authorize.transitions(),
            vec![Created, Checking, Requesting, Finished]
        );
        assert_eq!(
            provider.calls(),
            vec![ProviderCall::RequestStatus, ProviderCall::Authorize]
        );
    }

    #[tokio::test]
    async fn test_determined_status_skips_request() {
        let coordinator = Coordinator::spawn();
        let provider = ScriptedProvider::new("auth-known", CapabilityStatus::NotAvailable);
        let provider = Arc::new(provider);
        let authorize = AuthorizeCapability::new(Arc::clone(&provider));

        let result = authorize.execute(&host("dep", &coordinator)).await;
        let expected = CapabilityError::new("auth-known", Reason::NotAvailable);

        assert_eq!(result, Err(TaskError::Capability(expected)));
        assert_eq!(authorize.transitions(), vec![Created, Checking, Finished]);
        assert_eq!(provider.calls(), vec![ProviderCall::RequestStatus]);
    }

    #[tokio::test]
    async fn test_authorize_resolves_to_denied() {
        let coordinator = Coordinator::spawn();
        let provider = Arc::new(
            ScriptedProvider::new("auth-denied", CapabilityStatus::NotDetermined)
                .authorizes_to(CapabilityStatus::Denied),
        );
        let authorize = AuthorizeCapability::new(provider);

        let result = authorize.execute(&host("dep", &coordinator)).await;
        let expected = CapabilityError::new("auth-denied", Reason::Denied);

        assert_eq!(result, Err(TaskError::Capability(expected)));
        assert_eq!(authorize.state(), Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_kind_never_prompts_concurrently() {
        let coordinator = Coordinator::spawn();
        // Status stays undetermined, so both tasks reach the request.
        let provider = Arc::new(
            ScriptedProvider::new("auth-serial", CapabilityStatus::NotDetermined)
                .authorizes_to(CapabilityStatus::NotDetermined)
                .with_prompt_latency(Duration::from_secs(1)),
        );

        let first = tokio::spawn(run_task(
            host("first", &coordinator),
            Arc::new(AuthorizeCapability::new(Arc::clone(&provider))),
        ));
        let second = tokio::spawn(run_task(
            host("second", &coordinator),
            Arc::new(AuthorizeCapability::new(Arc::clone(&provider))),
        ));
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(provider.max_concurrent_prompts(), 1);
        assert_eq!(
            provider.calls(),
            vec![
                ProviderCall::RequestStatus,
                ProviderCall::Authorize,
                ProviderCall::RequestStatus,
                ProviderCall::Authorize,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_kind_across_instances_serializes() {
        let coordinator = Coordinator::spawn();
        let make = || {
            Arc::new(
                ScriptedProvider::new("auth-instances", CapabilityStatus::NotDetermined)
                    .with_prompt_latency(Duration::from_secs(1)),
            )
        };
        let started = Instant::now();

        let first = tokio::spawn(run_task(
            host("first", &coordinator),
            Arc::new(AuthorizeCapability::new(make())),
        ));
        let second = tokio::spawn(run_task(
            host("second", &coordinator),
            Arc::new(AuthorizeCapability::new(make())),
        ));
        first.await.unwrap();
        second.await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_kinds_run_concurrently() {
        let coordinator = Coordinator::spawn();
        let make = |name: &str| {
            Arc::new(
                ScriptedProvider::new(name, CapabilityStatus::NotDetermined)
                    .with_prompt_latency(Duration::from_secs(1)),
            )
        };
        let started = Instant::now();

        let first = tokio::spawn(run_task(
            host("first", &coordinator),
            Arc::new(AuthorizeCapability::new(make("auth-kind-a"))),
        ));
        let second = tokio::spawn(run_task(
            host("second", &coordinator),
            Arc::new(AuthorizeCapability::new(make("auth-kind-b"))),
        ));
        first.await.unwrap();
        second.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_domain() {
        let coordinator = Coordinator::spawn();
        let provider = Arc::new(
            ScriptedProvider::new("auth-cancel", CapabilityStatus::NotDetermined)
                .with_prompt_latency(Duration::from_secs(60)),
        );
        let dependency = host("dep", &coordinator);
        let running = tokio::spawn(run_task(
            dependency.clone(),
            Arc::new(AuthorizeCapability::new(provider)),
        ));

        let registry = ExclusionRegistry::global();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.is_held("Authorize<auth-cancel>"));

        dependency.cancel();
        running.await.unwrap();

        assert!(dependency.is_cancelled());
        assert!(!registry.is_held("Authorize<auth-cancel>"));
    }
}
