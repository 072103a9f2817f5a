//! Subscriber trait for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: effects,
//! computed values and the effect behind a watcher. The graph only stores
//! ids; the runtime resolves an id to a `dyn Subscriber` when propagation
//! needs to act on it.

use crate::graph::SubId;

/// A node that can be notified when its dependencies change.
pub trait Subscriber {
    /// The subscriber's node id.
    fn id(&self) -> SubId;

    /// Recompute a derived value in place.
    ///
    /// Returns whether the value changed, which decides whether propagation
    /// continues to the value's own readers. Only called for
    /// [`SubKind::Derived`](crate::graph::SubKind::Derived) nodes.
    fn update(&self) -> bool {
        false
    }

    /// React to a dependency change after the propagation walk.
    ///
    /// Only called for [`SubKind::Effect`](crate::graph::SubKind::Effect) nodes.
    fn notify(&self) {}
}
