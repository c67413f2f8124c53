//! Heterogeneous error context storage.

use crate::TypedKey;
use crate::key::Slot;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Diagnostic values attached to an error, addressed by [`TypedKey`].
///
/// Reading with a `TypedKey<T>` only returns a value that was stored with a
/// key of the same name *and* the same `T`. Mismatched or absent entries read
/// as `None`.
///
/// Cloning is cheap: values are shared, not copied.
#[derive(Clone, Default)]
pub struct ErrorContext {
    entries: HashMap<Slot, Entry>,
}

impl ErrorContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding a single entry.
    pub fn with<T: Any + Send + Sync>(key: TypedKey<T>, value: T) -> Self {
        let mut context = Self::new();
        context.set(key, value);
        context
    }

    /// Insert or overwrite the value stored under `key`.
    pub fn set<T: Any + Send + Sync>(&mut self, key: TypedKey<T>, value: T) {
        self.entries.insert(
            key.slot(),
            Entry {
                value: Arc::new(value),
                type_name: type_name::<T>(),
            },
        );
    }

    /// Builder form of [`set`](Self::set).
    pub fn and<T: Any + Send + Sync>(mut self, key: TypedKey<T>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Borrow the value stored under `key`.
    pub fn get<T: Any + Send + Sync>(&self, key: &TypedKey<T>) -> Option<&T> {
        self.entries
            .get(&key.slot())
            .and_then(|entry| entry.value.downcast_ref::<T>())
    }

    /// Clone the value stored under `key`.
    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, key: &TypedKey<T>) -> Option<T> {
        self.get(key).cloned()
    }

    pub fn contains<T: Any + Send + Sync>(&self, key: &TypedKey<T>) -> bool {
        self.entries.contains_key(&key.slot())
    }

    /// Remove the entry under `key`, returning whether one was present.
    pub fn remove<T: Any + Send + Sync>(&mut self, key: &TypedKey<T>) -> bool {
        self.entries.remove(&key.slot()).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Raw names of all entries, sorted, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(|slot| slot.raw.as_ref()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(slot, entry)| (slot.raw.as_ref(), entry.type_name))
            .collect();
        entries.sort_unstable();
        f.debug_map().entries(entries).finish()
    }
}
