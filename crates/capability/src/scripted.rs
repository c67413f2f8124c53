//! In-memory capability provider driven by a script.
//!
//! Used by tests and by the `preflight` front end to stand in for real
//! permission backends.

use crate::{CapabilityProvider, CapabilityStatus, Completion, Error};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Serializable form of a [`CapabilityStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedStatus {
    NotDetermined,
    Authorized,
    Denied,
    NotAvailable,
    Error,
}

impl From<ScriptedStatus> for CapabilityStatus {
    fn from(status: ScriptedStatus) -> Self {
        match status {
            ScriptedStatus::NotDetermined => CapabilityStatus::NotDetermined,
            ScriptedStatus::Authorized => CapabilityStatus::Authorized,
            ScriptedStatus::Denied => CapabilityStatus::Denied,
            ScriptedStatus::NotAvailable => CapabilityStatus::NotAvailable,
            ScriptedStatus::Error => {
                CapabilityStatus::error(Error::Provider("scripted failure".to_string()))
            }
        }
    }
}

/// A call received by a [`ScriptedProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCall {
    RequestStatus,
    Authorize,
}

/// A provider whose status and authorization outcome are fixed up front.
///
/// `authorize` moves the current status to the scripted outcome, optionally
/// after a prompt latency (which requires a Tokio runtime).
pub struct ScriptedProvider {
    name: String,
    shared: Arc<Shared>,
    prompt_latency: Duration,
    drops_completions: bool,
}

struct Shared {
    status: Mutex<CapabilityStatus>,
    outcome: Mutex<CapabilityStatus>,
    calls: Mutex<Vec<ProviderCall>>,
    prompting: AtomicUsize,
    max_prompting: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedProvider {
    /// Create a provider currently reporting `status`, which authorizes to
    /// [`CapabilityStatus::Authorized`].
    pub fn new(name: impl Into<String>, status: impl Into<CapabilityStatus>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                status: Mutex::new(status.into()),
                outcome: Mutex::new(CapabilityStatus::Authorized),
                calls: Mutex::new(Vec::new()),
                prompting: AtomicUsize::new(0),
                max_prompting: AtomicUsize::new(0),
            }),
            prompt_latency: Duration::ZERO,
            drops_completions: false,
        }
    }

    /// Set the status `authorize` resolves to.
    pub fn authorizes_to(self, outcome: impl Into<CapabilityStatus>) -> Self {
        *lock(&self.shared.outcome) = outcome.into();
        self
    }

    /// Delay `authorize` completions, as a user answering a prompt would.
    pub fn with_prompt_latency(mut self, latency: Duration) -> Self {
        self.prompt_latency = latency;
        self
    }

    /// Break the provider contract: drop every completion unanswered.
    pub fn dropping_completions(mut self) -> Self {
        self.drops_completions = true;
        self
    }

    /// The current status.
    pub fn status(&self) -> CapabilityStatus {
        lock(&self.shared.status).clone()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.shared.calls).clone()
    }

    /// Highest number of `authorize` calls that were outstanding at once.
    pub fn max_concurrent_prompts(&self) -> usize {
        self.shared.max_prompting.load(Ordering::SeqCst)
    }

    fn record(&self, call: ProviderCall) {
        debug!(capability = %self.name, ?call, "scripted provider call");
        lock(&self.shared.calls).push(call);
    }
}

impl Shared {
    fn resolve_prompt(&self) -> CapabilityStatus {
        let outcome = lock(&self.outcome).clone();
        *lock(&self.status) = outcome.clone();
        self.prompting.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl CapabilityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_status(&self, completion: Completion<CapabilityStatus>) {
        self.record(ProviderCall::RequestStatus);
        if self.drops_completions {
            return;
        }
        completion.complete(self.status());
    }

    fn authorize(&self, completion: Completion<CapabilityStatus>) {
        self.record(ProviderCall::Authorize);
        if self.drops_completions {
            return;
        }

        let prompting = self.shared.prompting.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_prompting.fetch_max(prompting, Ordering::SeqCst);

        if self.prompt_latency.is_zero() {
            completion.complete(self.shared.resolve_prompt());
            return;
        }

        let shared = Arc::clone(&self.shared);
        let latency = self.prompt_latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            completion.complete(shared.resolve_prompt());
        });
    }
}
