//! Typed, heterogeneous diagnostic context for errors.
//!
//! Conditions and capabilities are written independently and often want to
//! attach diagnostic values to the errors they report. This crate provides a
//! small store that keeps those values strongly typed without a global key
//! registry.
//!
//! # Core Concepts
//!
//! ## TypedKey
//!
//! A [`TypedKey<T>`] pairs a human-readable name with the static type `T` of
//! the value it addresses. The physical storage key is derived from both, so
//! two features may pick the same name (say, `"currentSettings"`) for values
//! of different types without overwriting each other.
//!
//! ## ErrorContext
//!
//! An [`ErrorContext`] owns zero or more entries. Values go in with
//! [`ErrorContext::set`] and come back out with [`ErrorContext::get`] using
//! the same typed key. A lookup with a key of the wrong type is simply
//! "not found", never a failed cast.
//!
//! # Example
//!
//! ```
//! use context::{ErrorContext, TypedKey};
//!
//! const ATTEMPTS: TypedKey<u32> = TypedKey::new("attempts");
//! const ATTEMPTS_LABEL: TypedKey<String> = TypedKey::new("attempts");
//!
//! let mut context = ErrorContext::new();
//! context.set(ATTEMPTS, 3);
//! context.set(ATTEMPTS_LABEL, "three".to_string());
//!
//! assert_eq!(context.get(&ATTEMPTS), Some(&3));
//! assert_eq!(context.get(&ATTEMPTS_LABEL).map(String::as_str), Some("three"));
//! ```

mod key;
mod store;

pub use key::TypedKey;
pub use store::ErrorContext;
