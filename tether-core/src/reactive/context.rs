//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently running.
//! This enables automatic dependency tracking: when a source is read,
//! the runtime links it to the current subscriber.
//!
//! # Implementation
//!
//! A thread-local slot holds the active subscriber. Entering a context swaps
//! the new subscriber in, remembers the previous one and starts a tracking
//! pass; the guard's `Drop` ends the pass and swaps the previous subscriber
//! back. A computed value read from inside an effect therefore tracks its own
//! reads, and the effect resumes tracking afterwards.
//!
//! Because the restore happens in `Drop`, it also runs when a subscriber body
//! panics.

use std::cell::Cell;

use super::runtime::Runtime;
use crate::graph::SubId;

thread_local! {
    static ACTIVE_SUB: Cell<Option<SubId>> = Cell::new(None);
}

/// Guard that restores the previous subscriber when dropped.
#[derive(Debug)]
pub struct ReactiveContext {
    /// The subscriber whose pass this guard ends, if any.
    tracked: Option<SubId>,
    previous: Option<SubId>,
}

impl ReactiveContext {
    /// Start a tracking pass for `sub` and make it the active subscriber.
    pub(crate) fn enter(sub: SubId) -> Self {
        let previous = ACTIVE_SUB.with(|active| active.replace(Some(sub)));
        Runtime::with_graph(|graph| graph.start_track(sub));

        Self {
            tracked: Some(sub),
            previous,
        }
    }

    /// Clear the active subscriber until the guard is dropped.
    pub fn untracked() -> Self {
        let previous = ACTIVE_SUB.with(|active| active.replace(None));

        Self {
            tracked: None,
            previous,
        }
    }

    /// Check if there is an active subscriber.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber, if any.
    pub fn current_subscriber() -> Option<SubId> {
        ACTIVE_SUB.with(Cell::get)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if let Some(sub) = self.tracked {
            Runtime::try_with_graph(|graph| graph.end_track(sub));
        }
        let _ = ACTIVE_SUB.try_with(|active| active.set(self.previous));
    }
}

/// Run `f` without linking any reads to the current subscriber.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SubKind;

    fn subscriber() -> SubId {
        Runtime::with_graph(|graph| graph.add_subscriber(SubKind::Effect))
    }

    #[test]
    fn context_tracks_subscriber() {
        let id = subscriber();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
            assert!(Runtime::with_graph(|graph| graph.is_tracking(id)));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(!Runtime::with_graph(|graph| graph.is_tracking(id)));
    }

    #[test]
    fn nested_contexts() {
        let id1 = subscriber();
        let id2 = subscriber();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_hides_the_subscriber() {
        let id = subscriber();
        let _ctx = ReactiveContext::enter(id);

        untracked(|| assert!(ReactiveContext::current_subscriber().is_none()));

        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }

    #[test]
    fn panicking_body_restores_previous_subscriber() {
        let outer = subscriber();
        let inner = subscriber();
        let _ctx = ReactiveContext::enter(outer);

        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(inner);
            panic!("subscriber body failed");
        });

        assert!(result.is_err());
        assert_eq!(ReactiveContext::current_subscriber(), Some(outer));
        assert!(!Runtime::with_graph(|graph| graph.is_tracking(inner)));
    }
}
