//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. [`effect`] runs the function immediately to establish initial
//!    dependencies.
//!
//! 2. When any dependency changes, propagation notifies the effect. By
//!    default it re-runs synchronously; a scheduler can take over and decide
//!    when (or whether) to run it.
//!
//! 3. Every run is a fresh tracking pass: sources read this time are kept,
//!    sources no longer read are unlinked.
//!
//! # Stopping
//!
//! [`ReactiveEffect::stop`] unlinks the effect from everything it reads.
//! A stopped effect can still be run by hand, but it tracks nothing.
//!
//! # Differences from Computed
//!
//! - Computed values return a value to readers; effects are leaves.
//! - Computed values are lazy; effects are eager.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::runtime::{Runtime, SubscriberHandle};
use super::subscriber::Subscriber;
use crate::graph::{SourceId, SubId, SubKind};

type Scheduler<T> = Rc<dyn Fn(&ReactiveEffect<T>)>;

struct EffectInner<T> {
    handle: SubscriberHandle,
    this: Weak<EffectInner<T>>,
    f: Box<dyn Fn() -> T>,
    scheduler: RefCell<Option<Scheduler<T>>>,
    active: Cell<bool>,
    runs: Cell<usize>,
}

impl<T: 'static> EffectInner<T> {
    fn run(&self) -> T {
        self.runs.set(self.runs.get() + 1);

        if !self.active.get() {
            return (self.f)();
        }

        let _ctx = ReactiveContext::enter(self.handle.id());
        (self.f)()
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn id(&self) -> SubId {
        self.handle.id()
    }

    fn notify(&self) {
        // Cloned out so the scheduler may replace itself
        let scheduler = self.scheduler.borrow().clone();

        match (scheduler, self.this.upgrade()) {
            (Some(scheduler), Some(inner)) => scheduler(&ReactiveEffect(inner)),
            _ => {
                self.run();
            }
        }
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// Clones share the same effect. The effect lives as long as any clone does.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let effect = ReactiveEffect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
/// effect.run();
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct ReactiveEffect<T = ()>(Rc<EffectInner<T>>);

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect without running it.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self(Rc::new_cyclic(|weak: &Weak<EffectInner<T>>| {
            let subscriber: Weak<dyn Subscriber> = weak.clone();
            EffectInner {
                handle: Runtime::register(SubKind::Effect, subscriber),
                this: weak.clone(),
                f: Box::new(f),
                scheduler: RefCell::new(None),
                active: Cell::new(true),
                runs: Cell::new(0),
            }
        }))
    }

    /// Run the function as a tracking pass and return its result.
    pub fn run(&self) -> T {
        self.0.run()
    }

    /// Replace the synchronous re-run with `scheduler`.
    ///
    /// The scheduler receives the effect; it is expected to call
    /// [`ReactiveEffect::run`] at some point, or hand a [`WeakEffect`] to
    /// something that will.
    pub fn set_scheduler(&self, scheduler: impl Fn(&ReactiveEffect<T>) + 'static) {
        *self.0.scheduler.borrow_mut() = Some(Rc::new(scheduler));
    }

    /// Unlink from every dependency and stop tracking. Idempotent.
    pub fn stop(&self) {
        if !self.0.active.replace(false) {
            return;
        }

        let sub = self.0.handle.id();
        Runtime::with_graph(|graph| graph.clear_dependencies(sub));
        tracing::debug!(subscriber = sub.raw(), "effect stopped");
    }

    /// Whether the effect still tracks its reads.
    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// Whether a dependency changed since the last run.
    pub fn is_dirty(&self) -> bool {
        Runtime::is_dirty(self.sub_id())
    }

    /// Number of times the function has run.
    pub fn run_count(&self) -> usize {
        self.0.runs.get()
    }

    /// The effect's subscriber node.
    pub fn sub_id(&self) -> SubId {
        self.0.handle.id()
    }

    /// Sources read during the last run, in read order.
    pub fn dependencies(&self) -> Vec<SourceId> {
        Runtime::dependencies(self.sub_id())
    }

    /// A handle that does not keep the effect alive.
    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect(Rc::downgrade(&self.0))
    }

    /// Whether both handles share the same effect.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("sub", &self.0.handle.id())
            .field("active", &self.0.active.get())
            .field("runs", &self.0.runs.get())
            .finish()
    }
}

/// A non-owning handle to a [`ReactiveEffect`].
pub struct WeakEffect<T = ()>(Weak<EffectInner<T>>);

impl<T> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<T: 'static> WeakEffect<T> {
    /// The effect, if it is still alive.
    pub fn upgrade(&self) -> Option<ReactiveEffect<T>> {
        self.0.upgrade().map(ReactiveEffect)
    }

    /// Run the effect if it is still alive.
    pub fn run(&self) -> Option<T> {
        self.0.upgrade().map(|inner| inner.run())
    }
}

/// Options for [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    scheduler: Option<Scheduler<()>>,
}

impl EffectOptions {
    /// Use `scheduler` instead of re-running synchronously.
    pub fn scheduler(mut self, scheduler: impl Fn(&ReactiveEffect) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// Owner of an effect created by [`effect`].
///
/// Dropping the runner drops the effect, which removes it from the graph.
#[must_use = "dropping the runner disposes the effect"]
#[derive(Debug, Clone)]
pub struct EffectRunner {
    effect: ReactiveEffect,
}

impl EffectRunner {
    /// Run the effect again by hand.
    pub fn run(&self) {
        self.effect.run();
    }

    /// The underlying effect.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }

    /// Stop the effect. Idempotent.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

/// Create an effect and run it once.
pub fn effect<F>(f: F) -> EffectRunner
where
    F: Fn() + 'static,
{
    effect_with(f, EffectOptions::default())
}

/// Create an effect with options and run it once.
pub fn effect_with<F>(f: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + 'static,
{
    let effect = ReactiveEffect::new(f);
    *effect.0.scheduler.borrow_mut() = options.scheduler;

    effect.run();
    EffectRunner { effect }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Ref;

    fn log() -> Rc<RefCell<Vec<i32>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn effect_runs_immediately_and_on_change() {
        let count = Ref::new(0);
        let seen = log();

        let runner = effect({
            let (count, seen) = (count.clone(), seen.clone());
            move || seen.borrow_mut().push(count.get())
        });

        count.set(1);
        count.set(2);

        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        assert_eq!(runner.effect().run_count(), 3);
    }

    #[test]
    fn effect_returns_its_value_from_run() {
        let count = Ref::new(3);
        let effect = ReactiveEffect::new({
            let count = count.clone();
            move || count.get() * 2
        });

        assert_eq!(effect.run(), 6);
        assert_eq!(effect.dependencies(), vec![count.source_id()]);
    }

    #[test]
    fn stop_is_idempotent_and_unlinks() {
        let count = Ref::new(0);
        let seen = log();

        let runner = effect({
            let (count, seen) = (count.clone(), seen.clone());
            move || seen.borrow_mut().push(count.get())
        });

        runner.stop();
        runner.stop();
        assert!(!runner.effect().is_active());
        assert_eq!(count.subscriber_count(), 0);

        count.set(1);
        assert_eq!(*seen.borrow(), vec![0]);

        // Manual runs still work but do not track
        runner.run();
        assert_eq!(*seen.borrow(), vec![0, 1]);
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn scheduler_replaces_the_rerun() {
        let count = Ref::new(0);
        let seen = log();
        let pending: Rc<RefCell<Vec<WeakEffect>>> = Rc::new(RefCell::new(Vec::new()));

        let runner = effect_with(
            {
                let (count, seen) = (count.clone(), seen.clone());
                move || seen.borrow_mut().push(count.get())
            },
            EffectOptions::default().scheduler({
                let pending = pending.clone();
                move |effect: &ReactiveEffect| pending.borrow_mut().push(effect.downgrade())
            }),
        );

        count.set(1);
        count.set(2);

        // Dirty after the first notification, so only one job was queued
        assert_eq!(pending.borrow().len(), 1);
        assert_eq!(*seen.borrow(), vec![0]);

        let job = pending.borrow_mut().remove(0);
        job.run();
        assert_eq!(*seen.borrow(), vec![0, 2]);
        assert!(!runner.effect().is_dirty());
    }

    #[test]
    fn effect_writing_what_it_reads_does_not_loop() {
        let count = Ref::new(0);

        let runner = effect({
            let count = count.clone();
            move || {
                let n = count.get();
                if n < 10 {
                    count.set(n + 1);
                }
            }
        });

        // The write happens while tracking, so it does not re-enter
        assert_eq!(count.get_untracked(), 1);
        assert_eq!(runner.effect().run_count(), 1);
    }

    #[test]
    fn dropped_effect_is_not_run() {
        let count = Ref::new(0);
        let seen = log();

        let runner = effect({
            let (count, seen) = (count.clone(), seen.clone());
            move || seen.borrow_mut().push(count.get())
        });
        let weak = runner.effect().downgrade();

        drop(runner);
        count.set(1);

        assert_eq!(*seen.borrow(), vec![0]);
        assert!(weak.upgrade().is_none());
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn branches_unlink_sources_no_longer_read() {
        let flag = Ref::new(true);
        let a = Ref::new(1);
        let b = Ref::new(2);
        let seen = log();

        let _runner = effect({
            let (flag, a, b, seen) = (flag.clone(), a.clone(), b.clone(), seen.clone());
            move || {
                let value = if flag.get() { a.get() } else { b.get() };
                seen.borrow_mut().push(value);
            }
        });
        assert_eq!(a.subscriber_count(), 1);

        flag.set(false);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);

        a.set(10);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }
}
