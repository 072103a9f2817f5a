//! Computed Values
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. A computed value owns two graph nodes: a subscriber node that tracks
//!    what the getter reads, and a source node that its own readers link to.
//!
//! 2. The subscriber node starts dirty. The first read runs the getter and
//!    caches the result.
//!
//! 3. When a dependency changes, propagation marks the computed dirty. If
//!    something is reading the computed, it recomputes right away and passes
//!    the change on only if the new value differs from the cached one.
//!    Otherwise it stays dirty until the next read.
//!
//! # Why This Matters
//!
//! - A ref changes
//! - 10 computed values depend on it
//! - Only the ones with readers, or that get read later, recompute
//! - An unchanged result stops the change from reaching downstream effects

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::runtime::{Runtime, SourceHandle, SubscriberHandle};
use super::subscriber::Subscriber;
use super::value::has_changed;
use crate::error::{ReactiveError, Result};
use crate::graph::{SourceId, SubId, SubKind};

struct ComputedInner<T> {
    handle: SubscriberHandle,
    source: SourceHandle,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
}

impl<T: PartialEq + Clone + 'static> Subscriber for ComputedInner<T> {
    fn id(&self) -> SubId {
        self.handle.id()
    }

    fn update(&self) -> bool {
        let new = {
            let _ctx = ReactiveContext::enter(self.handle.id());
            (self.getter)()
        };

        let old = self.value.borrow_mut().replace(new);
        match (&old, &*self.value.borrow()) {
            (Some(old), Some(new)) => has_changed(new, old),
            _ => true,
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. The `PartialEq` bound decides
///   whether a recomputation counts as a change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Computed<T>(Rc<ComputedInner<T>>);

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> Computed<T>
where
    T: PartialEq + Clone + 'static,
{
    /// Create a read-only computed value.
    ///
    /// The getter is not run immediately. It runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None)
    }

    /// Create a computed value whose writes are forwarded to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>) -> Self {
        Self(Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let source = Runtime::source();
            let weak: Weak<dyn Subscriber> = weak.clone();
            ComputedInner {
                handle: Runtime::register(SubKind::Derived(source.id()), weak),
                source,
                getter,
                setter,
                value: RefCell::new(None),
            }
        }))
    }

    /// Get the value, recomputing first if a dependency changed.
    ///
    /// If called while a subscriber runs, this also links the computed to it.
    pub fn get(&self) -> T {
        let inner = &self.0;
        if self.is_dirty() || inner.value.borrow().is_none() {
            inner.update();
        }

        Runtime::track(inner.source.id());

        inner
            .value
            .borrow()
            .clone()
            .expect("computed value is evaluated before it is read")
    }

    /// Write through the setter.
    ///
    /// Without a setter the write is dropped with a warning. The cached value
    /// is never touched; it follows from the getter.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.0.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                tracing::warn!(source = self.source_id().raw(), "write to read-only computed value");
                Err(ReactiveError::ReadOnly)
            }
        }
    }

    /// Whether a dependency changed since the last evaluation.
    pub fn is_dirty(&self) -> bool {
        Runtime::is_dirty(self.0.handle.id())
    }

    /// Check if the getter has run at least once.
    pub fn has_value(&self) -> bool {
        self.0.value.borrow().is_some()
    }

    /// Whether a setter was supplied.
    pub fn is_writable(&self) -> bool {
        self.0.setter.is_some()
    }

    /// The source node readers link to.
    pub fn source_id(&self) -> SourceId {
        self.0.source.id()
    }

    /// The subscriber node that tracks the getter's reads.
    pub fn sub_id(&self) -> SubId {
        self.0.handle.id()
    }
}

impl<T> Computed<T> {
    /// Whether both handles share the same computed value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("source", &self.0.source.id())
            .field("value", &self.0.value.try_borrow().ok())
            .finish()
    }
}

/// Shorthand for [`Computed::new`].
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: PartialEq + Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Ref};
    use std::cell::Cell;

    fn counted<T: PartialEq + Clone + 'static>(
        f: impl Fn() -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let computed = Computed::new({
            let calls = calls.clone();
            move || {
                calls.set(calls.get() + 1);
                f()
            }
        });
        (computed, calls)
    }

    #[test]
    fn computed_evaluates_on_first_access() {
        let (value, calls) = counted(|| 42);

        // Not computed yet
        assert!(!value.has_value());
        assert!(value.is_dirty());
        assert_eq!(calls.get(), 0);

        assert_eq!(value.get(), 42);
        assert_eq!(calls.get(), 1);
        assert!(value.has_value());
        assert!(!value.is_dirty());
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let (value, calls) = counted(|| 42);

        assert_eq!(value.get(), 42);
        assert_eq!(value.get(), 42);
        assert_eq!(value.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_without_readers_recomputes_lazily() {
        let count = Ref::new(1);
        let (doubled, calls) = counted({
            let count = count.clone();
            move || count.get() * 2
        });

        assert_eq!(doubled.get(), 2);

        count.set(2);
        count.set(3);

        // Marked dirty, but nothing recomputed yet
        assert!(doubled.is_dirty());
        assert_eq!(calls.get(), 1);

        assert_eq!(doubled.get(), 6);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computed_with_readers_recomputes_eagerly() {
        let count = Ref::new(1);
        let (doubled, calls) = counted({
            let count = count.clone();
            move || count.get() * 2
        });
        let seen = Rc::new(Cell::new(0));

        let _runner = effect({
            let (doubled, seen) = (doubled.clone(), seen.clone());
            move || seen.set(doubled.get())
        });

        count.set(5);

        assert_eq!(calls.get(), 2);
        assert_eq!(seen.get(), 10);
    }

    #[test]
    fn chained_computed_values() {
        let count = Ref::new(1);
        let doubled = computed({
            let count = count.clone();
            move || count.get() * 2
        });
        let quadrupled = computed({
            let doubled = doubled.clone();
            move || doubled.get() * 2
        });

        assert_eq!(quadrupled.get(), 4);

        count.set(3);
        assert_eq!(quadrupled.get(), 12);
    }

    #[test]
    fn read_only_computed_rejects_writes() {
        let (value, _) = counted(|| 1);
        assert_eq!(value.get(), 1);

        assert_eq!(value.set(5), Err(ReactiveError::ReadOnly));
        assert!(!value.is_writable());
        assert_eq!(value.get(), 1);
    }

    #[test]
    fn setter_forwards_writes() {
        let count = Ref::new(1);
        let plus_one = Computed::with_setter(
            {
                let count = count.clone();
                move || count.get() + 1
            },
            {
                let count = count.clone();
                move |value: i32| count.set(value - 1)
            },
        );

        assert_eq!(plus_one.set(10), Ok(()));
        assert_eq!(count.get(), 9);
        assert_eq!(plus_one.get(), 10);
    }

    #[test]
    fn dropping_a_computed_frees_its_nodes() {
        let before = Runtime::stats();
        let count = Ref::new(1);
        let doubled = computed({
            let count = count.clone();
            move || count.get() * 2
        });
        doubled.get();
        assert_eq!(count.subscriber_count(), 1);

        drop(doubled);

        assert_eq!(count.subscriber_count(), 0);
        assert_eq!(Runtime::stats().subscribers, before.subscribers);
    }
}
