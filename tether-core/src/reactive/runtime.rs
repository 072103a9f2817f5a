//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, reactive
//! objects, computed values and effects. It owns the link graph and the
//! registry that maps subscriber ids back to live subscribers.
//!
//! # How It Works
//!
//! 1. Every ref, reactive object key and computed value owns a source node;
//!    every effect and computed value owns a subscriber node.
//!
//! 2. When a source is read while a subscriber is running, the runtime links
//!    the two (see [`Graph::link`]).
//!
//! 3. When a source changes, [`Runtime::propagate`] walks its subscribers:
//!    a. Running or already dirty subscribers are skipped
//!    b. The rest are marked dirty
//!    c. Computed values with readers recompute on the spot and continue the
//!       walk through their own readers only if their value changed
//!    d. Effects are collected and notified once the whole walk is done
//!
//! # Threading
//!
//! All state is thread-local. Each thread gets an independent graph, and
//! reactive handles are `!Send`, so no locking is involved anywhere.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::Subscriber;
use crate::graph::{Graph, GraphStats, SourceId, SubId, SubKind};

thread_local! {
    static GRAPH: RefCell<Graph> = RefCell::new(Graph::new());

    // Maps subscriber ids to weak references so the graph never keeps a
    // subscriber alive on its own.
    static REGISTRY: RefCell<HashMap<SubId, Weak<dyn Subscriber>>> = RefCell::new(HashMap::new());
}

/// Handle to a registered subscriber node.
///
/// Dropping this handle removes the subscriber and all of its links.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubId,
}

impl SubscriberHandle {
    /// The subscriber node id.
    pub fn id(&self) -> SubId {
        self.id
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}

/// Handle to a source node.
///
/// Dropping this handle removes the source and all of its links.
#[derive(Debug)]
pub struct SourceHandle {
    id: SourceId,
}

impl SourceHandle {
    /// The source node id.
    pub fn id(&self) -> SourceId {
        self.id
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        Runtime::try_with_graph(|graph| graph.remove_source(self.id));
    }
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Run `f` with the thread's graph.
    pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
        GRAPH.with(|graph| f(&mut graph.borrow_mut()))
    }

    /// Like [`Runtime::with_graph`], but does nothing once the thread-local
    /// graph has been torn down. Used from `Drop` impls.
    pub(crate) fn try_with_graph(f: impl FnOnce(&mut Graph)) {
        let _ = GRAPH.try_with(|graph| f(&mut graph.borrow_mut()));
    }

    /// Register a subscriber.
    ///
    /// Returns a handle that unregisters the subscriber when dropped.
    pub fn register(kind: SubKind, subscriber: Weak<dyn Subscriber>) -> SubscriberHandle {
        let id = Self::with_graph(|graph| graph.add_subscriber(kind));

        REGISTRY.with(|registry| registry.borrow_mut().insert(id, subscriber));

        SubscriberHandle { id }
    }

    /// Allocate a source node.
    pub fn source() -> SourceHandle {
        SourceHandle {
            id: Self::with_graph(Graph::add_source),
        }
    }

    /// Unregister a subscriber and drop its links.
    fn unregister(id: SubId) {
        let _ = REGISTRY.try_with(|registry| registry.borrow_mut().remove(&id));
        Self::try_with_graph(|graph| graph.remove_subscriber(id));
    }

    fn lookup(id: SubId) -> Option<Rc<dyn Subscriber>> {
        REGISTRY.with(|registry| registry.borrow().get(&id).and_then(Weak::upgrade))
    }

    /// Record that the running subscriber, if any, read `dep`.
    pub fn track(dep: SourceId) {
        if let Some(sub) = ReactiveContext::current_subscriber() {
            Self::with_graph(|graph| graph.link(dep, sub));
        }
    }

    /// Notify everything downstream of `dep` that it changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn propagate(dep: SourceId) {
        Self::propagate_all(&[dep]);
    }

    /// Propagate several changed sources as one batch.
    ///
    /// Effects reached through more than one source are notified once, after
    /// every walk has finished.
    pub fn propagate_all(deps: &[SourceId]) {
        let mut queued: SmallVec<[Rc<dyn Subscriber>; 8]> = SmallVec::new();

        for &dep in deps {
            Self::walk(dep, &mut queued);
        }

        for effect in queued {
            effect.notify();
        }
    }

    fn walk(dep: SourceId, queued: &mut SmallVec<[Rc<dyn Subscriber>; 8]>) {
        let subscribers = Self::with_graph(|graph| graph.subscribers(dep));

        if subscribers.is_empty() {
            return;
        }

        tracing::trace!(
            source = dep.raw(),
            subscribers = subscribers.len(),
            "propagating change"
        );

        for (link, sub) in subscribers {
            // A recomputation earlier in this walk may have retired the link
            let Some(kind) = Self::with_graph(|graph| graph.mark_dirty(link, dep, sub)) else {
                continue;
            };
            let Some(subscriber) = Self::lookup(sub) else {
                continue;
            };

            match kind {
                SubKind::Derived(own) => {
                    // Without readers the value stays dirty until next read
                    if Self::with_graph(|graph| graph.has_subscribers(own)) && subscriber.update() {
                        Self::walk(own, queued);
                    }
                }
                SubKind::Effect => queued.push(subscriber),
            }
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking pass.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Counters for the thread's graph.
    pub fn stats() -> GraphStats {
        Self::with_graph(|graph| graph.stats())
    }

    /// Number of links joining `dep` and `sub`.
    pub fn link_count(dep: SourceId, sub: SubId) -> usize {
        Self::with_graph(|graph| graph.link_count(dep, sub))
    }

    /// Number of subscriber links on `dep`.
    pub fn subscriber_count(dep: SourceId) -> usize {
        Self::with_graph(|graph| graph.subscriber_count(dep))
    }

    /// Sources tracked by `sub`, in read order.
    pub fn dependencies(sub: SubId) -> Vec<SourceId> {
        Self::with_graph(|graph| graph.dependencies(sub))
    }

    /// Whether `sub` has a pending change.
    pub fn is_dirty(sub: SubId) -> bool {
        Self::with_graph(|graph| graph.is_dirty(sub))
    }
}
