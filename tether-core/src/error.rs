//! Error types for the reactive engine.
//!
//! Graph bookkeeping never fails at runtime. The errors here cover misuse of
//! the public surface: writing a read-only computed value and addressing a
//! container with a key it cannot hold.

use thiserror::Error;

use crate::reactive::Key;

/// Errors reported by reactive primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A computed value without a setter was written to.
    #[error("computed value is read-only")]
    ReadOnly,

    /// The key does not address a slot of this container kind.
    #[error("key {key} is not valid for {kind} container")]
    InvalidKey {
        /// The rejected key.
        key: Key,
        /// `"an object"` or `"an array"`.
        kind: &'static str,
    },

    /// An array length must be a non-negative integer.
    #[error("invalid array length {0}")]
    InvalidLength(f64),

    /// The value is not an object or array.
    #[error("expected an object or array, found {found}")]
    NotContainer {
        /// Kind of the value that was found instead.
        found: &'static str,
    },

    /// A container was reached twice while converting to JSON.
    #[error("cannot serialize a cyclic container")]
    Cycle,
}

/// Result alias used across the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
