//! Watchers
//!
//! [`watch`] calls a callback with the new and previous value of a source
//! every time the source changes.
//!
//! # How It Works
//!
//! 1. The source is turned into a getter: a ref or computed value reads its
//!    value, a reactive object returns itself, a function is used as is.
//!
//! 2. With deep watching, the getter also walks the result and reads every
//!    property of every nested reactive object, so a change anywhere inside
//!    counts as a change of the source. Reactive object sources are deep
//!    unless told otherwise.
//!
//! 3. The getter runs as an effect whose scheduler is the watch job: run the
//!    pending cleanup, re-run the getter, call the callback, remember the new
//!    value as the next old value.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::computed::Computed;
use super::effect::ReactiveEffect;
use super::object::Reactive;
use super::refs::Ref;
use super::value::{TargetId, Value};
use crate::graph::SourceId;

/// Something that can be watched.
pub struct WatchSource {
    kind: SourceKind,
}

enum SourceKind {
    Getter(Box<dyn Fn() -> Value>),
    Reactive(Reactive),
}

impl WatchSource {
    /// Watch whatever `f` returns. Only reads made inside `f` are tracked.
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        Self {
            kind: SourceKind::Getter(Box::new(f)),
        }
    }
}

impl<T> From<Ref<T>> for WatchSource
where
    T: PartialEq + Clone + Into<Value> + 'static,
{
    fn from(r: Ref<T>) -> Self {
        Self::getter(move || r.get().into())
    }
}

impl<T> From<Computed<T>> for WatchSource
where
    T: PartialEq + Clone + Into<Value> + 'static,
{
    fn from(computed: Computed<T>) -> Self {
        Self::getter(move || computed.get().into())
    }
}

impl From<Reactive> for WatchSource {
    fn from(reactive: Reactive) -> Self {
        Self {
            kind: SourceKind::Reactive(reactive),
        }
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::Getter(_) => f.write_str("WatchSource::Getter"),
            SourceKind::Reactive(reactive) => f.debug_tuple("WatchSource::Reactive").field(reactive).finish(),
        }
    }
}

/// How far a deep watch looks into nested objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deep {
    /// Only the getter's own reads count.
    Disabled,
    /// Every level.
    Unbounded,
    /// This many levels. `Depth(1)` reads the top-level properties only.
    Depth(usize),
}

impl Deep {
    fn limit(self) -> Option<usize> {
        match self {
            Self::Disabled => None,
            Self::Unbounded => Some(usize::MAX),
            Self::Depth(depth) => Some(depth),
        }
    }
}

impl From<bool> for Deep {
    fn from(deep: bool) -> Self {
        if deep {
            Self::Unbounded
        } else {
            Self::Disabled
        }
    }
}

impl From<usize> for Deep {
    fn from(depth: usize) -> Self {
        Self::Depth(depth)
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Call the callback once right away, with no old value.
    pub immediate: bool,
    /// Stop after the first callback.
    pub once: bool,
    /// Deep watching. `None` means deep for reactive object sources and
    /// shallow for everything else.
    pub deep: Option<Deep>,
}

impl WatchOptions {
    /// Set `immediate`.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Set `once`.
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Set `deep`.
    pub fn deep(mut self, deep: impl Into<Deep>) -> Self {
        self.deep = Some(deep.into());
        self
    }
}

/// Registers the cleanup for the current callback.
///
/// The cleanup runs before the next callback, or when the watch stops.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    /// Replace the pending cleanup with `f`.
    pub fn register(&self, f: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }

    fn run(&self) {
        let pending = self.slot.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.slot.borrow().is_some())
            .finish()
    }
}

type Callback = Box<dyn Fn(&Value, Option<&Value>, &OnCleanup)>;

struct WatchState {
    callback: Callback,
    old: RefCell<Option<Value>>,
    cleanup: OnCleanup,
    once: bool,
}

impl WatchState {
    fn job(&self, effect: &ReactiveEffect<Value>) {
        self.cleanup.run();

        let new = effect.run();
        let old = self.old.borrow_mut().take();
        (self.callback)(&new, old.as_ref(), &self.cleanup);
        *self.old.borrow_mut() = Some(new);

        if self.once {
            effect.stop();
        }
    }
}

/// Owner of a watch created by [`watch`].
///
/// Dropping the handle disposes the watch.
#[must_use = "dropping the handle disposes the watch"]
pub struct WatchHandle {
    effect: ReactiveEffect<Value>,
    state: Rc<WatchState>,
}

impl WatchHandle {
    /// Stop watching and run the pending cleanup. Idempotent.
    pub fn stop(&self) {
        if self.effect.is_active() {
            tracing::debug!(subscriber = self.effect.sub_id().raw(), "watch stopped");
        }
        self.effect.stop();
        self.state.cleanup.run();
    }

    /// Whether the watch still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// The effect driving the watch.
    pub fn effect(&self) -> &ReactiveEffect<Value> {
        &self.effect
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("once", &self.state.once)
            .finish()
    }
}

/// Call `callback(new, old, on_cleanup)` whenever `source` changes.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// let handle = watch(
///     count.clone(),
///     |new, old, _| println!("{old:?} -> {new:?}"),
///     WatchOptions::default(),
/// );
///
/// count.set(1); // prints "Some(Number(0.0)) -> Number(1.0)"
/// handle.stop();
/// ```
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    F: Fn(&Value, Option<&Value>, &OnCleanup) + 'static,
{
    let (base, implied_deep): (Box<dyn Fn() -> Value>, bool) = match source.into().kind {
        SourceKind::Getter(getter) => (getter, false),
        SourceKind::Reactive(reactive) => (Box::new(move || Value::Reactive(reactive.clone())), true),
    };

    let deep = options.deep.unwrap_or(Deep::from(implied_deep));
    let effect = match deep.limit() {
        Some(depth) => ReactiveEffect::new(move || {
            let value = base();
            traverse(&value, depth, &mut Seen::default());
            value
        }),
        None => ReactiveEffect::new(base),
    };

    let state = Rc::new(WatchState {
        callback: Box::new(callback),
        old: RefCell::new(None),
        cleanup: OnCleanup::default(),
        once: options.once,
    });

    effect.set_scheduler({
        let state = Rc::clone(&state);
        move |effect: &ReactiveEffect<Value>| state.job(effect)
    });

    if options.immediate {
        state.job(&effect);
    } else {
        *state.old.borrow_mut() = Some(effect.run());
    }

    WatchHandle { effect, state }
}

/// Containers and refs already visited by one traversal.
#[derive(Default)]
struct Seen {
    targets: HashSet<TargetId>,
    refs: HashSet<SourceId>,
}

/// Read every property below `value`, up to `depth` levels.
fn traverse(value: &Value, depth: usize, seen: &mut Seen) {
    if depth == 0 {
        return;
    }

    match value {
        Value::Reactive(reactive) => {
            if !seen.targets.insert(reactive.id()) {
                return;
            }
            for key in reactive.keys() {
                traverse(&reactive.get(key), depth - 1, seen);
            }
        }
        Value::Container(container) => {
            if !seen.targets.insert(container.id()) {
                return;
            }
            for key in container.keys() {
                traverse(&container.get(&key), depth - 1, seen);
            }
        }
        Value::Ref(r) => {
            if seen.refs.insert(r.source_id()) {
                traverse(&r.get(), depth, seen);
            }
        }
        _ => {}
    }
}
