use super::{CANCELLED_DEPENDENCIES, Condition, ConditionError, Verdict};
use crate::task::{TaskHandle, TaskSummary};
use async_trait::async_trait;
use context::ErrorContext;

/// Requires that none of the host task's dependencies were cancelled.
///
/// On failure the context lists the cancelled dependencies under
/// [`CANCELLED_DEPENDENCIES`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCancelledDependencies;

impl NoCancelledDependencies {
    pub const NAME: &'static str = "NoCancelledDependencies";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Condition for NoCancelledDependencies {
    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    async fn evaluate(&self, task: &TaskHandle) -> Verdict {
        let cancelled: Vec<TaskSummary> = task
            .dependencies()
            .iter()
            .filter(|dependency| dependency.is_cancelled())
            .map(TaskHandle::summary)
            .collect();

        if cancelled.is_empty() {
            Verdict::Satisfied
        } else {
            Verdict::Failed(ConditionError::with_context(
                Self::NAME,
                ErrorContext::with(CANCELLED_DEPENDENCIES, cancelled),
            ))
        }
    }
}
