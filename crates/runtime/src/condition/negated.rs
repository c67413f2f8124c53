use super::{Condition, ConditionError, NEGATED_CONDITION, Verdict};
use crate::task::{Task, TaskHandle};
use async_trait::async_trait;
use context::ErrorContext;
use std::sync::Arc;

/// Inverts another condition's verdict.
///
/// Useful to run a task only while something is *not* the case. The
/// dependency of the wrapped condition is passed through unchanged.
pub struct Negated<C> {
    inner: C,
}

impl<C: Condition> Negated<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Condition> Condition for Negated<C> {
    fn name(&self) -> String {
        format!("Not<{}>", self.inner.name())
    }

    fn is_mutually_exclusive(&self) -> bool {
        self.inner.is_mutually_exclusive()
    }

    fn dependency(&self, task: &TaskHandle) -> Option<Arc<dyn Task>> {
        self.inner.dependency(task)
    }

    async fn evaluate(&self, task: &TaskHandle) -> Verdict {
        match self.inner.evaluate(task).await {
            Verdict::Failed(_) => Verdict::Satisfied,
            Verdict::Satisfied => Verdict::Failed(ConditionError::with_context(
                self.name(),
                ErrorContext::with(NEGATED_CONDITION, self.inner.name()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::tests::Fixed;
    use crate::coordinator::Coordinator;

    fn host() -> TaskHandle {
        TaskHandle::new("host", Coordinator::spawn())
    }

    #[tokio::test]
    async fn test_satisfied_inner_fails() {
        let negated = Negated::new(Fixed {
            name: "Reachable",
            satisfied: true,
        });

        let verdict = negated.evaluate(&host()).await;
        let error = verdict.error().unwrap();

        assert_eq!(error.condition_name, "Not<Reachable>");
        assert_eq!(
            error.get(&NEGATED_CONDITION).map(String::as_str),
            Some("Reachable")
        );
    }

    #[tokio::test]
    async fn test_failed_inner_satisfies() {
        let negated = Negated::new(Fixed {
            name: "Reachable",
            satisfied: false,
        });

        assert_eq!(negated.evaluate(&host()).await, Verdict::Satisfied);
    }

    #[tokio::test]
    async fn test_double_negation_restores_verdict() {
        let twice = Negated::new(Negated::new(Fixed {
            name: "Reachable",
            satisfied: true,
        }));

        assert_eq!(twice.name(), "Not<Not<Reachable>>");
        assert_eq!(twice.inner().name(), "Not<Reachable>");
        assert_eq!(twice.inner().inner().name, "Reachable");
        assert_eq!(twice.evaluate(&host()).await, Verdict::Satisfied);
    }

    #[tokio::test]
    async fn test_no_dependency_when_inner_has_none() {
        let negated = Negated::new(Fixed {
            name: "Reachable",
            satisfied: true,
        });

        assert!(negated.dependency(&host()).is_none());
        assert!(!negated.is_mutually_exclusive());
    }
}
