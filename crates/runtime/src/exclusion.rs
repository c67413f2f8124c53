//! Named mutual-exclusion domains.
//!
//! One lock per domain name, created on first use and never torn down.
//! Waiters are served in arrival order.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

static GLOBAL: OnceLock<ExclusionRegistry> = OnceLock::new();

/// Table of exclusion domains keyed by name.
#[derive(Debug, Default)]
pub struct ExclusionRegistry {
    domains: DashMap<String, Arc<Mutex<()>>>,
}

impl ExclusionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    fn domain(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.domains.get(name) {
            return Arc::clone(lock.value());
        }
        let entry = self.domains.entry(name.to_string()).or_default();
        Arc::clone(entry.value())
    }

    /// Wait until `name` is free and hold it until the guard is dropped.
    pub async fn acquire(&self, name: &str) -> ExclusionGuard {
        let lock = self.domain(name);
        debug!(domain = name, "waiting for exclusion domain");
        let guard = lock.lock_owned().await;
        debug!(domain = name, "exclusion domain acquired");
        ExclusionGuard {
            name: name.to_string(),
            _guard: guard,
        }
    }

    /// Acquire several domains. Names are deduplicated and taken in sorted
    /// order so concurrent callers cannot deadlock on each other.
    pub async fn acquire_all<I, S>(&self, names: I) -> Vec<ExclusionGuard>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort_unstable();
        names.dedup();

        let mut guards = Vec::with_capacity(names.len());
        for name in &names {
            guards.push(self.acquire(name).await);
        }
        guards
    }

    /// Whether `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.domains
            .get(name)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

/// Holds an exclusion domain; releases it on drop.
#[derive(Debug)]
pub struct ExclusionGuard {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl ExclusionGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ExclusionGuard {
    fn drop(&mut self) {
        debug!(domain = %self.name, "exclusion domain released");
    }
}
