//! Deadline enforcement for host tasks.

use crate::task::{Observer, TaskHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// A task ran past its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {timeout:?}")]
pub struct TimeoutError {
    pub timeout: Duration,
}

/// Observer that cancels a task still running `timeout` after it started.
///
/// The guard holds only a weak reference to the task, so an abandoned task is
/// not kept alive by its deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Observer for TimeoutGuard {
    fn did_start(&self, task: &TaskHandle) {
        let weak = task.downgrade();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(task) = weak.upgrade() else {
                return;
            };
            if task.is_finished() || task.is_cancelled() {
                return;
            }
            warn!(task = %task.name(), id = %task.id(), ?timeout, "task timed out");
            task.cancel_with_error(TimeoutError { timeout }.into());
        });
    }
}
