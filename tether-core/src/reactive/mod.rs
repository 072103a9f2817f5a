//! Reactive Primitives
//!
//! This module implements the user-facing side of the reactive system: refs,
//! reactive objects, computed values, effects and watchers. They all sit on
//! top of the link graph in [`crate::graph`].
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for mutable state. When a ref is read while an
//! effect or computed value runs, the runtime records the dependency. When
//! the ref is written, everything that read it is notified.
//!
//! ## Reactive Objects
//!
//! A [`Reactive`] wraps a dynamic object or array ([`Value`]). Each property
//! is tracked separately, and nested objects are wrapped as they are read.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changes, and stops the change from
//! spreading further if the new result equals the old one.
//!
//! ## Effects and Watchers
//!
//! An effect is a side-effecting computation that re-runs whenever its
//! dependencies change. A watch is an effect that hands the callback both
//! the new and the previous value.
//!
//! # Implementation Notes
//!
//! A thread-local tracking context detects dependencies automatically: when
//! a source is read, the runtime links it to the subscriber that is
//! currently running, if any.

mod computed;
mod context;
mod effect;
mod object;
mod refs;
mod runtime;
mod subscriber;
mod value;
mod watch;

pub use computed::{computed, Computed};
pub use context::{untracked, ReactiveContext};
pub use effect::{effect, effect_with, EffectOptions, EffectRunner, ReactiveEffect, WeakEffect};
pub use object::{is_reactive, reactive, Reactive};
pub use refs::{is_ref, proxy_refs, to_ref, to_refs, trigger_ref, unref, ObjectRef, ProxyRefs, Ref};
pub use runtime::{Runtime, SourceHandle, SubscriberHandle};
pub use subscriber::Subscriber;
pub use value::{has_changed, Container, Key, TargetId, Value, MAX_ARRAY_LENGTH};
pub use watch::{watch, Deep, OnCleanup, WatchHandle, WatchOptions, WatchSource};
