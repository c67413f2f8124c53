//! Typed keys for error context entries.

use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A human-readable name paired with the static type of the value it addresses.
///
/// Two keys with the same raw name but different `T` address different
/// entries. Keys are usually declared as constants:
///
/// ```
/// use context::TypedKey;
///
/// const RETRIES: TypedKey<u32> = TypedKey::new("Retries");
/// assert_eq!(RETRIES.raw_name(), "Retries");
/// ```
pub struct TypedKey<T> {
    raw: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedKey<T> {
    /// Create a key from a static name.
    pub const fn new(raw: &'static str) -> Self {
        Self {
            raw: Cow::Borrowed(raw),
            _marker: PhantomData,
        }
    }

    /// Create a key from a name built at runtime.
    pub fn named(raw: impl Into<String>) -> Self {
        Self {
            raw: Cow::Owned(raw.into()),
            _marker: PhantomData,
        }
    }

    /// The human-readable name of this key.
    pub fn raw_name(&self) -> &str {
        &self.raw
    }
}

impl<T: 'static> TypedKey<T> {
    /// The physical storage key: raw name plus the identity of `T`.
    pub(crate) fn slot(&self) -> Slot {
        Slot {
            raw: self.raw.clone(),
            type_id: TypeId::of::<T>(),
        }
    }
}

// Manual impls: deriving would put bounds on `T`.
impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for TypedKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for TypedKey<T> {}

impl<T> Hash for TypedKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for TypedKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedKey<{}>({:?})", type_name::<T>(), self.raw)
    }
}

impl<T> fmt::Display for TypedKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Derived storage key. Never exposed: reads always go through a `TypedKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Slot {
    pub(crate) raw: Cow<'static, str>,
    pub(crate) type_id: TypeId,
}
