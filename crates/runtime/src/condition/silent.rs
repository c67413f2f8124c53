use super::{Condition, Verdict};
use crate::task::TaskHandle;
use async_trait::async_trait;

/// Evaluates another condition without running its dependency.
///
/// Use it to check a capability without prompting for it.
pub struct Silent<C> {
    inner: C,
}

impl<C: Condition> Silent<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: Condition> Condition for Silent<C> {
    fn name(&self) -> String {
        format!("Silent<{}>", self.inner.name())
    }

    fn is_mutually_exclusive(&self) -> bool {
        self.inner.is_mutually_exclusive()
    }

    async fn evaluate(&self, task: &TaskHandle) -> Verdict {
        self.inner.evaluate(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::CapabilityCondition;
    use crate::coordinator::Coordinator;
    use capability::{CapabilityStatus, ProviderCall, ScriptedProvider};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_suppresses_dependency_and_passes_verdict() {
        let host = TaskHandle::new("host", Coordinator::spawn());
        let provider = ScriptedProvider::new("location", CapabilityStatus::NotDetermined);
        let provider = Arc::new(provider);
        let silent = Silent::new(CapabilityCondition::new(Arc::clone(&provider)));

        assert!(silent.dependency(&host).is_none());
        assert!(silent.is_mutually_exclusive());
        assert_eq!(silent.name(), "Silent<Capability<location>>");

        let verdict = silent.evaluate(&host).await;
        let error = verdict.error().unwrap();
        assert_eq!(error.condition_name, "Capability<location>");
        assert_eq!(provider.calls(), vec![ProviderCall::RequestStatus]);
    }
}
