//! Reactive Objects
//!
//! A [`Reactive`] wraps a [`Container`] and turns its slots into sources.
//! Reads through the wrapper are tracked per key, writes notify only the
//! subscribers of the keys they touch.
//!
//! # How It Works
//!
//! 1. A thread-local target map holds, for each container, an ordered
//!    key → source map. A key's source is created on its first tracked read
//!    and lives until the container is dropped.
//!
//! 2. [`Reactive::get`] tracks the key, then unwraps a stored ref (tracking
//!    the ref too) and wraps a stored raw container on the fly.
//!
//! 3. [`Reactive::set`] stores the raw value and propagates the key if the
//!    value changed. Writes that change the number of elements or properties
//!    also propagate `Length`. Shrinking an array through `Length`
//!    propagates every index that fell off the end.
//!
//! 4. Wrappers are memoized per container, so wrapping the same container
//!    twice yields the same wrapper.
//!
//! For objects, `Length` is not a property. Its source stands for the key
//! set, which is what [`Reactive::keys`] and [`Reactive::len`] observe.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::runtime::{Runtime, SourceHandle};
use super::value::{has_changed, Container, Key, TargetId, Value};
use crate::error::{ReactiveError, Result};
use crate::graph::SourceId;

thread_local! {
    static TARGETS: RefCell<HashMap<TargetId, IndexMap<Key, SourceHandle>>> = RefCell::new(HashMap::new());
    static PROXIES: RefCell<HashMap<TargetId, Weak<ProxyInner>>> = RefCell::new(HashMap::new());
}

/// Record a read of `key` on `target` by the running subscriber.
fn track(target: TargetId, key: &Key) {
    if !ReactiveContext::is_active() {
        return;
    }

    let dep = TARGETS.with(|targets| {
        let mut targets = targets.borrow_mut();
        let deps = targets.entry(target).or_default();
        match deps.get(key) {
            Some(handle) => handle.id(),
            None => {
                let handle = Runtime::source();
                let id = handle.id();
                deps.insert(key.clone(), handle);
                id
            }
        }
    });

    Runtime::track(dep);
}

/// Collect the sources a write to `key` has to propagate.
///
/// `shrunk_to` is set when an array was truncated through `Length`.
fn collect(target: TargetId, key: &Key, shrunk_to: Option<usize>, out: &mut SmallVec<[SourceId; 4]>) {
    TARGETS.with(|targets| {
        let targets = targets.borrow();
        let Some(deps) = targets.get(&target) else {
            return;
        };

        match (key, shrunk_to) {
            (Key::Length, Some(len)) => {
                for (key, handle) in deps {
                    let hit = match key {
                        Key::Length => true,
                        Key::Index(index) => *index >= len,
                        Key::Prop(_) => false,
                    };
                    if hit && !out.contains(&handle.id()) {
                        out.push(handle.id());
                    }
                }
            }
            _ => {
                if let Some(handle) = deps.get(key) {
                    if !out.contains(&handle.id()) {
                        out.push(handle.id());
                    }
                }
            }
        }
    });
}

/// Drop the per-key sources of a container that is going away.
pub(crate) fn forget_target(id: TargetId) {
    let deps = TARGETS
        .try_with(|targets| {
            targets
                .try_borrow_mut()
                .ok()
                .and_then(|mut targets| targets.remove(&id))
        })
        .ok()
        .flatten();

    if let Some(deps) = deps {
        tracing::debug!(container = ?id, keys = deps.len(), "dropping container sources");
    }
}

struct ProxyInner {
    target: Container,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        let id = self.target.id();
        let _ = PROXIES.try_with(|proxies| {
            if let Ok(mut proxies) = proxies.try_borrow_mut() {
                proxies.remove(&id);
            }
        });
    }
}

/// A reactive view of an object or array.
///
/// # Example
///
/// ```rust,ignore
/// let state = Reactive::from_json(json!({ "count": 0 }))?;
///
/// let runner = effect({
///     let state = state.clone();
///     move || println!("count = {:?}", state.get("count"))
/// });
///
/// state.set("count", 1)?; // effect re-runs
/// ```
#[derive(Clone)]
pub struct Reactive(Rc<ProxyInner>);

impl Reactive {
    /// Wrap a container, reusing the existing wrapper if there is one.
    pub fn new(target: Container) -> Self {
        let id = target.id();

        let existing = PROXIES.with(|proxies| proxies.borrow().get(&id).and_then(Weak::upgrade));
        if let Some(inner) = existing {
            return Self(inner);
        }

        let inner = Rc::new(ProxyInner { target });
        PROXIES.with(|proxies| proxies.borrow_mut().insert(id, Rc::downgrade(&inner)));
        Self(inner)
    }

    /// Build a reactive object or array from JSON.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        match Value::from(json) {
            Value::Container(container) => Ok(Self::new(container)),
            other => Err(ReactiveError::NotContainer { found: other.kind() }),
        }
    }

    /// The raw container behind this wrapper.
    pub fn target(&self) -> &Container {
        &self.0.target
    }

    /// Identity of the wrapped container.
    pub fn id(&self) -> TargetId {
        self.0.target.id()
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether this wraps an array.
    pub fn is_array(&self) -> bool {
        self.0.target.is_array()
    }

    /// The source backing `key`, if it has been read under tracking.
    pub fn source_id(&self, key: impl Into<Key>) -> Option<SourceId> {
        let key = self.0.target.normalize(key.into());
        TARGETS.with(|targets| {
            targets
                .borrow()
                .get(&self.id())
                .and_then(|deps| deps.get(&key))
                .map(SourceHandle::id)
        })
    }

    /// Read a slot.
    ///
    /// Tracks the key. A stored ref is unwrapped and tracked too; a stored raw
    /// container comes back wrapped.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let target = &self.0.target;
        let key = target.normalize(key.into());
        track(self.id(), &key);

        match target.get(&key) {
            Value::Ref(r) => wrap(r.get()),
            value => wrap(value),
        }
    }

    /// Write a slot.
    ///
    /// Writing a non-ref value over a stored ref sets the ref instead. Wrappers are stored as their raw container.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let target = &self.0.target;
        let key = target.normalize(key.into());
        let value = match value.into() {
            Value::Reactive(reactive) => Value::Container(reactive.target().clone()),
            value => value,
        };

        let old = target.get(&key);
        if let Value::Ref(r) = &old {
            if !matches!(value, Value::Ref(_)) {
                r.set(value);
                return Ok(());
            }
        }

        let old_len = target.len();
        let changed = has_changed(&value, &old);
        target.set(key.clone(), value)?;
        let new_len = target.len();

        let mut deps = SmallVec::new();
        if key == Key::Length {
            if changed {
                collect(self.id(), &key, Some(new_len), &mut deps);
            }
        } else {
            if changed {
                collect(self.id(), &key, None, &mut deps);
            }
            if new_len != old_len {
                collect(self.id(), &Key::Length, None, &mut deps);
            }
        }

        if !deps.is_empty() {
            Runtime::propagate_all(&deps);
        }
        Ok(())
    }

    /// Number of elements or properties. Tracks `Length`.
    pub fn len(&self) -> usize {
        track(self.id(), &Key::Length);
        self.0.target.len()
    }

    /// Whether there are no elements or properties. Tracks `Length`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in order. Tracks `Length`.
    pub fn keys(&self) -> Vec<Key> {
        track(self.id(), &Key::Length);
        self.0.target.keys()
    }

    fn expect_array(&self, key: Key) -> Result<()> {
        if self.is_array() {
            Ok(())
        } else {
            Err(ReactiveError::InvalidKey {
                key,
                kind: "an object",
            })
        }
    }

    /// Append to an array, returning the new length.
    ///
    /// Does not track `Length`, so an effect that pushes does not subscribe
    /// to its own writes.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let len = self.0.target.len();
        self.expect_array(Key::Index(len))?;
        self.set(Key::Index(len), value)?;
        Ok(len + 1)
    }

    /// Remove and return the last element of an array. `Null` when empty.
    pub fn pop(&self) -> Result<Value> {
        self.expect_array(Key::Length)?;
        let len = self.0.target.len();
        if len == 0 {
            return Ok(Value::Null);
        }

        let last = self.0.target.get(&Key::Index(len - 1));
        self.set_len(len - 1)?;
        Ok(wrap(last))
    }

    /// Truncate or extend an array.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.expect_array(Key::Length)?;
        self.set(Key::Length, len)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(&self.0.target).finish()
    }
}

fn wrap(value: Value) -> Value {
    match value {
        Value::Container(container) => Value::Reactive(Reactive::new(container)),
        value => value,
    }
}

/// Make a value reactive.
///
/// Containers are wrapped (memoized per container); wrappers, refs and
/// scalars are returned unchanged.
pub fn reactive(value: impl Into<Value>) -> Value {
    wrap(value.into())
}

/// Whether the value is a reactive wrapper.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use serde_json::json;
    use std::cell::Cell;

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn wrapping_is_memoized() {
        let container = Container::object();
        let a = Reactive::new(container.clone());
        let b = Reactive::new(container.clone());

        assert!(a.ptr_eq(&b));
        assert_eq!(reactive(Value::from(a.clone())), Value::from(b));
        assert_eq!(reactive(1), Value::from(1));
        assert!(is_reactive(&reactive(container)));
    }

    #[test]
    fn nested_containers_come_back_wrapped() {
        let state = Reactive::from_json(json!({ "inner": { "n": 1 } })).expect("object");

        let first = state.get("inner");
        let second = state.get("inner");

        assert!(is_reactive(&first));
        assert_eq!(first, second);
    }

    #[test]
    fn from_json_rejects_scalars() {
        assert_eq!(
            Reactive::from_json(json!(3)).map(|_| ()),
            Err(ReactiveError::NotContainer { found: "number" })
        );
    }

    #[test]
    fn writes_only_notify_readers_of_that_key() {
        let state = Reactive::from_json(json!({ "a": 1, "b": 2 })).expect("object");
        let runs = counter();

        let _runner = effect({
            let state = state.clone();
            let runs = runs.clone();
            move || {
                state.get("a");
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        state.set("b", 3).expect("object key");
        assert_eq!(runs.get(), 1);

        state.set("a", 1).expect("object key");
        assert_eq!(runs.get(), 1, "same value does not notify");

        state.set("a", 5).expect("object key");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn adding_a_property_notifies_key_readers() {
        let state = Reactive::from_json(json!({})).expect("object");
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _runner = effect({
            let state = state.clone();
            let seen = seen.clone();
            move || seen.borrow_mut().push(state.keys().len())
        });

        state.set("x", Value::Null).expect("object key");
        state.set("x", 1).expect("object key");

        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn push_notifies_length_readers() {
        let list = Reactive::from_json(json!([1, 2])).expect("array");
        let lengths = Rc::new(RefCell::new(Vec::new()));

        let _runner = effect({
            let list = list.clone();
            let lengths = lengths.clone();
            move || lengths.borrow_mut().push(list.len())
        });

        assert_eq!(list.push(3), Ok(3));
        assert_eq!(*lengths.borrow(), vec![2, 3]);
    }

    #[test]
    fn shrinking_notifies_truncated_indices() {
        let list = Reactive::from_json(json!([1, 2, 3])).expect("array");
        let first = counter();
        let third = counter();

        let _a = effect({
            let (list, first) = (list.clone(), first.clone());
            move || {
                list.get(0usize);
                first.set(first.get() + 1);
            }
        });
        let _b = effect({
            let (list, third) = (list.clone(), third.clone());
            move || {
                list.get(2usize);
                third.set(third.get() + 1);
            }
        });

        list.set_len(1).expect("array");

        assert_eq!(first.get(), 1);
        assert_eq!(third.get(), 2);
        assert!(list.get(2usize).is_null());
    }

    #[test]
    fn pop_returns_the_last_element() {
        let list = Reactive::from_json(json!([1, 2])).expect("array");

        assert_eq!(list.pop(), Ok(Value::from(2)));
        assert_eq!(list.pop(), Ok(Value::from(1)));
        assert_eq!(list.pop(), Ok(Value::Null));
        assert!(list.is_empty());
    }

    #[test]
    fn array_operations_reject_objects() {
        let state = Reactive::from_json(json!({})).expect("object");

        assert!(state.push(1).is_err());
        assert!(state.set_len(0).is_err());
    }

    #[test]
    fn oversized_array_writes_fail_without_notifying() {
        let list = Reactive::from_json(json!([1])).expect("array");
        let runs = Rc::new(Cell::new(0));
        let _runner = effect({
            let (list, runs) = (list.clone(), runs.clone());
            move || {
                list.len();
                runs.set(runs.get() + 1);
            }
        });

        assert!(matches!(
            list.set(usize::MAX, 1),
            Err(ReactiveError::InvalidKey { .. })
        ));
        assert!(matches!(
            list.set_len(crate::reactive::MAX_ARRAY_LENGTH + 1),
            Err(ReactiveError::InvalidLength(_))
        ));

        assert_eq!(list.len(), 1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn dropping_the_container_frees_key_sources() {
        let before = Runtime::stats().sources;
        let state = Reactive::from_json(json!({ "a": 1 })).expect("object");

        let runner = effect({
            let state = state.clone();
            move || {
                state.get("a");
            }
        });
        assert!(state.source_id("a").is_some());
        assert_eq!(Runtime::stats().sources, before + 1);

        drop(runner);
        drop(state);

        assert_eq!(Runtime::stats().sources, before);
    }
}
