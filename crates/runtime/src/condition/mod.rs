//! Conditions gating a host task.
//!
//! A [`Condition`] may offer a dependency task that proactively satisfies it,
//! and is evaluated asynchronously once the host task's dependencies have
//! finished. Combinators ([`Negated`], [`Silent`]) wrap another condition.

mod capability_backed;
mod negated;
mod no_cancelled;
mod silent;

pub use capability_backed::CapabilityCondition;
pub use negated::Negated;
pub use no_cancelled::NoCancelledDependencies;
pub use silent::Silent;

use crate::task::{Task, TaskHandle, TaskSummary};
use async_trait::async_trait;
use capability::CapabilityError;
use context::{ErrorContext, TypedKey};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Name of the condition a [`Negated`] condition wrapped.
pub const NEGATED_CONDITION: TypedKey<String> = TypedKey::new("NegatedCondition");

/// Dependencies found cancelled by [`NoCancelledDependencies`].
pub const CANCELLED_DEPENDENCIES: TypedKey<Vec<TaskSummary>> =
    TypedKey::new("CancelledDependencies");

/// Why a [`CapabilityCondition`] failed.
pub const CAPABILITY_ERROR: TypedKey<CapabilityError> = TypedKey::new("CapabilityError");

/// A named condition was not satisfied.
///
/// Equality compares `condition_name` only; the context is diagnostic.
#[derive(Debug, Clone, Error)]
#[error("condition {condition_name} failed{}", detail(.context))]
pub struct ConditionError {
    pub condition_name: String,
    pub context: Option<ErrorContext>,
}

fn detail(context: &Option<ErrorContext>) -> String {
    context
        .as_ref()
        .and_then(|context| context.get(&CAPABILITY_ERROR))
        .map(|error| format!(": {error}"))
        .unwrap_or_default()
}

impl ConditionError {
    pub fn new(condition_name: impl Into<String>) -> Self {
        Self {
            condition_name: condition_name.into(),
            context: None,
        }
    }

    pub fn with_context(condition_name: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            condition_name: condition_name.into(),
            context: Some(context),
        }
    }

    /// Look up a diagnostic value.
    pub fn get<T: std::any::Any + Send + Sync>(&self, key: &TypedKey<T>) -> Option<&T> {
        self.context.as_ref().and_then(|context| context.get(key))
    }
}

impl PartialEq for ConditionError {
    fn eq(&self, other: &Self) -> bool {
        self.condition_name == other.condition_name
    }
}

/// Outcome of evaluating a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Satisfied,
    Failed(ConditionError),
}

impl Verdict {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    pub fn error(&self) -> Option<&ConditionError> {
        match self {
            Self::Satisfied => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// A prerequisite for running a host task.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Name reported in [`ConditionError`]s.
    fn name(&self) -> String;

    /// Whether two host tasks gated by this kind of condition must not run
    /// at the same time.
    fn is_mutually_exclusive(&self) -> bool {
        false
    }

    /// A task to run before the host task to try to satisfy this condition.
    ///
    /// Called once when the host task is built; must not have side effects
    /// beyond constructing the task.
    fn dependency(&self, _task: &TaskHandle) -> Option<Arc<dyn Task>> {
        None
    }

    /// Decide whether the condition holds for `task`.
    ///
    /// Expected negative outcomes are `Verdict::Failed`, never panics.
    async fn evaluate(&self, task: &TaskHandle) -> Verdict;
}

/// Evaluate `condition` in the background and hand the verdict to `on_done`.
///
/// `on_done` runs exactly once, unless the runtime shuts down first.
pub fn evaluate_with<F>(
    condition: Arc<dyn Condition>,
    task: TaskHandle,
    on_done: F,
) -> JoinHandle<()>
where
    F: FnOnce(Verdict) + Send + 'static,
{
    tokio::spawn(async move {
        let verdict = condition.evaluate(&task).await;
        on_done(verdict);
    })
}
