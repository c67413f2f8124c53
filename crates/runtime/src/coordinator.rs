//! The coordination context.
//!
//! Provider calls and evaluations that touch shared provider state are all
//! started from one serialized queue, so providers never see two calls begin
//! at once. Jobs only *start* work here; completions may arrive on any
//! thread.

use crate::{Error, Result};
use capability::{CapabilityProvider, CapabilityStatus, Completion};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to a serialized execution queue.
#[derive(Debug, Clone)]
pub struct Coordinator {
    tx: mpsc::UnboundedSender<Job>,
}

impl Coordinator {
    /// Start a coordination context on the current Tokio runtime.
    ///
    /// The context runs until every handle has been dropped. A job that
    /// panics is logged and skipped; the completion it owned is dropped, so
    /// its caller sees [`capability::Error::CompletionDropped`].
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    warn!(panic = panic_message(&*payload), "coordination job panicked");
                }
            }
            debug!("coordination context stopped");
        });
        Self { tx }
    }

    /// Queue `job` behind everything already dispatched.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.tx
            .send(Box::new(job))
            .map_err(|_| Error::CoordinatorClosed)
    }

    /// Start a callback-style operation on the coordination context and wait
    /// for its completion.
    pub async fn call<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Completion<T>) + Send + 'static,
    {
        let (completion, pending) = Completion::channel();
        self.dispatch(move || operation(completion))?;
        Ok(pending.await?)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// The two provider operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProviderOp {
    RequestStatus,
    Authorize,
}

/// Run a provider operation on the coordination context.
///
/// Never fails: infrastructure errors and contract violations surface as
/// [`CapabilityStatus::Error`], so every caller still gets exactly one status.
pub(crate) async fn provider_status<P>(
    coordinator: &Coordinator,
    provider: &Arc<P>,
    op: ProviderOp,
) -> CapabilityStatus
where
    P: CapabilityProvider + ?Sized,
{
    let target = Arc::clone(provider);
    let result = coordinator
        .call(move |completion| match op {
            ProviderOp::RequestStatus => target.request_status(completion),
            ProviderOp::Authorize => target.authorize(completion),
        })
        .await;

    match result {
        Ok(status) => {
            debug!(capability = provider.name(), ?op, %status, "provider answered");
            status
        }
        Err(error) => {
            warn!(capability = provider.name(), ?op, %error, "provider call failed");
            CapabilityStatus::error(error)
        }
    }
}
