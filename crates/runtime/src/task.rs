//! Task handles, the task contract and task observers.
//!
//! A [`TaskHandle`] is the host-scheduler view of one unit of work: its
//! identity, its dependency set, and the cancel/finish operations conditions
//! and observers act on.

use crate::TaskError;
use crate::coordinator::Coordinator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// A unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task. Cancellation is tracked separately: a cancelled task
/// still moves to `Finished` once its work has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Evaluating,
    Executing,
    Finished,
}

/// Point-in-time description of a task, safe to store in error context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: TaskState,
    cancelled: bool,
}

struct Inner {
    id: TaskId,
    name: String,
    coordinator: Coordinator,
    status: watch::Sender<Status>,
    errors: Mutex<Vec<TaskError>>,
    dependencies: Mutex<Vec<TaskHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared handle to a task's scheduler state.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<Inner>,
}

/// Non-owning reference to a task; does not keep it alive.
#[derive(Clone)]
pub struct WeakTaskHandle {
    inner: Weak<Inner>,
}

impl WeakTaskHandle {
    pub fn upgrade(&self) -> Option<TaskHandle> {
        self.inner.upgrade().map(|inner| TaskHandle { inner })
    }
}

impl TaskHandle {
    /// Create a pending task bound to a coordination context.
    pub fn new(name: impl Into<String>, coordinator: Coordinator) -> Self {
        let (status, _) = watch::channel(Status {
            state: TaskState::Pending,
            cancelled: false,
        });
        Self {
            inner: Arc::new(Inner {
                id: TaskId::new(),
                name: name.into(),
                coordinator,
                status,
                errors: Mutex::new(Vec::new()),
                dependencies: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The coordination context provider calls for this task must run on.
    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub fn state(&self) -> TaskState {
        self.inner.status.borrow().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.status.borrow().cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    /// Errors attached so far by cancellation or by the task's own failure.
    pub fn errors(&self) -> Vec<TaskError> {
        lock(&self.inner.errors).clone()
    }

    pub fn dependencies(&self) -> Vec<TaskHandle> {
        lock(&self.inner.dependencies).clone()
    }

    pub fn add_dependency(&self, dependency: TaskHandle) {
        lock(&self.inner.dependencies).push(dependency);
    }

    pub fn summary(&self) -> TaskSummary {
        let status = *self.inner.status.borrow();
        TaskSummary {
            id: self.id(),
            name: self.name().to_string(),
            state: status.state,
            cancelled: status.cancelled,
        }
    }

    pub fn downgrade(&self) -> WeakTaskHandle {
        WeakTaskHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.inner.status.send_if_modified(|status| {
            if status.state == TaskState::Finished || status.state == state {
                return false;
            }
            status.state = state;
            true
        });
        debug!(task = %self.name(), id = %self.id(), ?state, "task state");
    }

    /// Cancel without attaching an error.
    pub fn cancel(&self) -> bool {
        self.cancel_with_errors(Vec::new())
    }

    pub fn cancel_with_error(&self, error: TaskError) -> bool {
        self.cancel_with_errors(vec![error])
    }

    /// Cancel the task, attaching `errors`.
    ///
    /// Returns `false` and attaches nothing if the task already finished or
    /// was already cancelled.
    pub fn cancel_with_errors(&self, errors: Vec<TaskError>) -> bool {
        let accepted = self.inner.status.send_if_modified(|status| {
            if status.cancelled || status.state == TaskState::Finished {
                return false;
            }
            lock(&self.inner.errors).extend(errors);
            status.cancelled = true;
            true
        });
        if accepted {
            info!(task = %self.name(), id = %self.id(), "task cancelled");
        }
        accepted
    }

    /// Mark the task finished, attaching any errors from its work.
    pub fn finish(&self, errors: Vec<TaskError>) {
        self.inner.status.send_if_modified(|status| {
            if status.state == TaskState::Finished {
                return false;
            }
            lock(&self.inner.errors).extend(errors);
            status.state = TaskState::Finished;
            true
        });
    }

    /// Resolve once the task has been cancelled.
    pub async fn cancelled(&self) {
        let mut status = self.inner.status.subscribe();
        // The sender lives in `self`, so this only returns once cancelled.
        let _ = status.wait_for(|status| status.cancelled).await;
    }

    /// Resolve once the task has finished.
    pub async fn finished(&self) {
        let mut status = self.inner.status.subscribe();
        let _ = status
            .wait_for(|status| status.state == TaskState::Finished)
            .await;
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A unit of work the engine can run: a host operation's body or a
/// dependency injected by a condition.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> String;

    /// Run the work. Dropped without completing if the task is cancelled.
    async fn execute(&self, task: &TaskHandle) -> Result<(), TaskError>;
}

/// A [`Task`] built from a closure.
pub struct FnTask<F> {
    name: String,
    work: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(TaskHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, work: F) -> Self {
        Self {
            name: name.into(),
            work,
        }
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, task: &TaskHandle) -> Result<(), TaskError> {
        (self.work)(task.clone()).await
    }
}

/// Lifecycle callbacks for a host task. All methods default to no-ops.
pub trait Observer: Send + Sync {
    /// The host is about to execute its work.
    fn did_start(&self, _task: &TaskHandle) {}

    /// The host was cancelled. Delivered as soon as the engine sees the
    /// cancellation, while the host may still be evaluating or executing,
    /// and at most once per run.
    fn did_cancel(&self, _task: &TaskHandle) {}

    /// The host finished with `errors`, after every other callback.
    fn did_finish(&self, _task: &TaskHandle, _errors: &[TaskError]) {}
}

/// Run a task to completion or cancellation, finishing its handle.
pub(crate) async fn run_task(handle: TaskHandle, task: Arc<dyn Task>) {
    handle.set_state(TaskState::Executing);
    let result = tokio::select! {
        result = task.execute(&handle) => Some(result),
        _ = handle.cancelled() => None,
    };
    match result {
        Some(Ok(())) => handle.finish(Vec::new()),
        Some(Err(error)) => {
            info!(task = %handle.name(), id = %handle.id(), %error, "task failed");
            handle.finish(vec![error]);
        }
        None => handle.finish(Vec::new()),
    }
}
