//! Tether Core
//!
//! This crate provides a fine-grained reactive engine. It implements:
//!
//! - Refs, reactive objects and arrays, computed values
//! - Effects and watchers that re-run when what they read changes
//! - A link graph that tracks dependencies with recycled edges
//! - A job queue for batching effect re-runs
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Source and subscriber nodes and the links between them
//! - `reactive`: Reactive primitives and automatic dependency tracking
//! - `scheduler`: Deferred jobs for batched updates
//! - `error`: Errors reported by the public surface
//!
//! All state is thread-local; handles are `!Send`.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::reactive::{effect, Computed, Ref};
//!
//! // Create a ref
//! let count = Ref::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let _runner = effect(move || {
//!     println!("Doubled: {}", doubled.get());
//! });
//!
//! // Update the ref
//! count.set(5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod error;
pub mod graph;
pub mod reactive;
pub mod scheduler;

pub use error::{ReactiveError, Result};
