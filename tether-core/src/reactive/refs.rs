//! Refs
//!
//! A [`Ref`] is the simplest source: one value behind a shared handle.
//!
//! # How Refs Work
//!
//! 1. Reading a ref while a subscriber runs links the ref to it.
//!
//! 2. Writing compares the new value with the stored one. The stored value is
//!    replaced only if it changed, but subscribers are notified on every
//!    write, so a ref doubles as a manual trigger.
//!
//! 3. A raw container written into a `Ref<Value>` is stored wrapped, so
//!    nested reads through the ref are reactive too.
//!
//! The helpers at the bottom bridge refs and reactive objects: [`to_ref`]
//! and [`to_refs`] expose object properties as ref-like handles, and
//! [`proxy_refs`] gives a view of an object that unwraps the refs it holds.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::object::Reactive;
use super::runtime::{Runtime, SourceHandle};
use super::value::{has_changed, Container, Key, Value};
use crate::error::{ReactiveError, Result};
use crate::graph::SourceId;

struct RefInner<T> {
    source: SourceHandle,
    value: RefCell<T>,
}

/// A reactive cell holding a value of type `T`.
///
/// Clones share the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Ref<T>(Rc<RefInner<T>>);

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> Ref<T>
where
    T: PartialEq + Clone + 'static,
{
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefInner {
            source: Runtime::source(),
            value: RefCell::new(reactivize(value)),
        }))
    }

    /// Get the current value.
    ///
    /// If called while a subscriber runs, this also links the ref to it.
    pub fn get(&self) -> T {
        Runtime::track(self.source_id());
        self.0.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.0.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    ///
    /// The ref must not be written from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.source_id());
        f(&self.0.value.borrow())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        let value = reactivize(value);
        let _replaced = {
            let mut slot = self.0.value.borrow_mut();
            has_changed(&value, &*slot).then(|| std::mem::replace(&mut *slot, value))
        };

        self.trigger();
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.0.value.borrow_mut());
        self.trigger();
    }

    /// Notify subscribers without changing the value.
    pub fn trigger(&self) {
        Runtime::propagate(self.source_id());
    }

    /// The ref's source node.
    pub fn source_id(&self) -> SourceId {
        self.0.source.id()
    }

    /// Number of subscriber links on this ref.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.source_id())
    }
}

impl<T> Ref<T> {
    /// Whether both handles share the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => f.debug_tuple("Ref").field(&*value).finish(),
            Err(_) => f.write_str("Ref(<borrowed>)"),
        }
    }
}

/// Store raw containers held in a `Value` as reactive wrappers.
fn reactivize<T: 'static>(mut value: T) -> T {
    if let Some(slot) = (&mut value as &mut dyn Any).downcast_mut::<Value>() {
        if let Value::Container(container) = slot {
            *slot = Value::Reactive(Reactive::new(container.clone()));
        }
    }
    value
}

/// Notify a ref's subscribers without changing its value.
pub fn trigger_ref<T: PartialEq + Clone + 'static>(r: &Ref<T>) {
    r.trigger();
}

/// Whether the value is a ref.
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The ref's value (tracked) if `value` is a ref, otherwise `value` itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// The object an [`ObjectRef`] or [`ProxyRefs`] forwards to.
#[derive(Debug, Clone)]
enum ObjectTarget {
    Reactive(Reactive),
    Raw(Container),
}

/// A ref-like handle to one property of an object.
///
/// Over a reactive object, reads and writes go through [`Reactive::get`] and
/// [`Reactive::set`] and are tracked and notified as usual. Over a raw
/// container they are plain reads and writes.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    target: ObjectTarget,
    key: Key,
}

impl ObjectRef {
    /// Read the property.
    pub fn get(&self) -> Value {
        match &self.target {
            ObjectTarget::Reactive(reactive) => reactive.get(self.key.clone()),
            ObjectTarget::Raw(container) => container.get(&self.key),
        }
    }

    /// Write the property.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        match &self.target {
            ObjectTarget::Reactive(reactive) => reactive.set(self.key.clone(), value),
            ObjectTarget::Raw(container) => container.set(self.key.clone(), value.into()),
        }
    }

    /// The property this handle points at.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Whether reads and writes go through a reactive object.
    pub fn is_reactive(&self) -> bool {
        matches!(self.target, ObjectTarget::Reactive(_))
    }
}

/// A ref-like handle to `key` on a reactive object.
pub fn to_ref(object: &Reactive, key: impl Into<Key>) -> ObjectRef {
    ObjectRef {
        target: ObjectTarget::Reactive(object.clone()),
        key: object.target().normalize(key.into()),
    }
}

/// One [`ObjectRef`] per property of an object, in order.
///
/// A raw container is accepted with a warning; the handles then read and
/// write the container directly and never notify.
pub fn to_refs(value: &Value) -> Result<IndexMap<Key, ObjectRef>> {
    let target = match value {
        Value::Reactive(reactive) => ObjectTarget::Reactive(reactive.clone()),
        Value::Container(container) => {
            tracing::warn!(container = ?container.id(), "to_refs expects a reactive object");
            ObjectTarget::Raw(container.clone())
        }
        other => return Err(ReactiveError::NotContainer { found: other.kind() }),
    };

    let keys = match &target {
        ObjectTarget::Reactive(reactive) => reactive.keys(),
        ObjectTarget::Raw(container) => container.keys(),
    };

    Ok(keys
        .into_iter()
        .map(|key| {
            let handle = ObjectRef {
                target: target.clone(),
                key: key.clone(),
            };
            (key, handle)
        })
        .collect())
}

/// A view of an object that unwraps the refs stored in it.
#[derive(Debug, Clone)]
pub struct ProxyRefs {
    target: ObjectTarget,
}

impl ProxyRefs {
    /// Read a property, unwrapping a stored ref.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let value = match &self.target {
            ObjectTarget::Reactive(reactive) => reactive.get(key),
            ObjectTarget::Raw(container) => container.get(&key.into()),
        };
        unref(&value)
    }

    /// Write a property. A non-ref value written over a stored ref sets the
    /// ref instead.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();

        match &self.target {
            ObjectTarget::Reactive(reactive) => reactive.set(key, value),
            ObjectTarget::Raw(container) => {
                if let Value::Ref(r) = container.get(&key) {
                    if !is_ref(&value) {
                        r.set(value);
                        return Ok(());
                    }
                }
                container.set(key, value)
            }
        }
    }
}

/// Wrap an object so its refs read and write like plain properties.
///
/// Reactive objects already behave this way and are forwarded as is.
pub fn proxy_refs(value: &Value) -> Result<ProxyRefs> {
    let target = match value {
        Value::Reactive(reactive) => ObjectTarget::Reactive(reactive.clone()),
        Value::Container(container) => ObjectTarget::Raw(container.clone()),
        other => return Err(ReactiveError::NotContainer { found: other.kind() }),
    };
    Ok(ProxyRefs { target })
}
