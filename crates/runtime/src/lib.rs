//! Preflight runtime: condition evaluation and capability authorization.
//!
//! This crate decides whether a host task may run. Conditions attached to a
//! task can inject dependency tasks that try to satisfy them (such as asking
//! for a capability), and are evaluated once those dependencies finish. A
//! failed condition cancels the host task with a structured error.
//!
//! # Overview
//!
//! - **Condition**: an asynchronous prerequisite with an optional dependency
//!   task. [`Negated`] and [`Silent`] wrap other conditions.
//! - **CapabilityCondition**: a condition backed by a
//!   [`capability::CapabilityProvider`], optionally requesting authorization
//!   through an [`AuthorizeCapability`] task.
//! - **Coordinator**: the serialized queue all provider calls start from.
//! - **Engine**: a minimal host driver running an [`Operation`] through
//!   dependencies, evaluation and execution.
//!
//! # Example
//!
//! ```
//! use capability::{CapabilityStatus, ScriptedProvider};
//! use runtime::{CapabilityCondition, Engine, EngineConfig, FnTask, Operation, TaskError};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> runtime::Result<()> {
//! let engine = Engine::new(EngineConfig::default())?;
//! let provider = ScriptedProvider::new("location", CapabilityStatus::NotDetermined);
//! let work = FnTask::new("share-location", |_| async { Ok::<(), TaskError>(()) });
//! let condition = CapabilityCondition::new(Arc::new(provider));
//!
//! let operation = Operation::new(Arc::new(work)).with_condition(Arc::new(condition));
//! let outcome = engine.run(operation).await;
//! assert!(outcome.succeeded());
//! # Ok(())
//! # }
//! ```

mod authorize;
pub mod condition;
mod coordinator;
mod engine;
mod error;
mod exclusion;
mod task;
mod timeout;

// Conditions
pub use condition::{
    CapabilityCondition, Condition, ConditionError, Negated, NoCancelledDependencies, Silent,
    Verdict, evaluate_with,
};

// Authorization
pub use authorize::{AuthorizationState, AuthorizeCapability, authorization_domain};
pub use exclusion::{ExclusionGuard, ExclusionRegistry};

// Tasks and scheduling
pub use coordinator::Coordinator;
pub use engine::{DependencyOutcome, Engine, EngineConfig, Operation, Outcome};
pub use task::{FnTask, Observer, Task, TaskHandle, TaskId, TaskState, TaskSummary, WeakTaskHandle};
pub use timeout::{TimeoutError, TimeoutGuard};

// Error types
pub use error::{Error, Result, TaskError};
