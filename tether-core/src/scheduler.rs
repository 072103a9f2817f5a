//! Job Scheduler
//!
//! A [`JobQueue`] defers work until the embedder decides to flush it, the
//! same role a host's microtask queue plays for a UI runtime.
//!
//! # Batching
//!
//! Paired with an effect scheduler, the queue turns many writes into one
//! re-run:
//!
//! 1. The first write marks the effect dirty and its scheduler queues a job.
//! 2. Further writes find the effect already dirty and queue nothing.
//! 3. [`JobQueue::flush`] runs the job once, against the final state.
//!
//! ```rust,ignore
//! let queue = JobQueue::new();
//! let effect = ReactiveEffect::new(render);
//! effect.set_scheduler({
//!     let queue = queue.clone();
//!     move |effect| {
//!         let effect = effect.downgrade();
//!         queue.queue_job(move || {
//!             effect.run();
//!         });
//!     }
//! });
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Job = Box<dyn FnOnce()>;

#[derive(Default)]
struct QueueInner {
    jobs: RefCell<VecDeque<Job>>,
    flushing: Cell<bool>,
}

/// A FIFO of deferred jobs. Clones share the same queue.
#[derive(Clone, Default)]
pub struct JobQueue {
    inner: Rc<QueueInner>,
}

/// Clears the flushing flag even if a job panics.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job for the next flush.
    pub fn queue_job(&self, job: impl FnOnce() + 'static) {
        self.inner.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Queue `f` to run after the jobs already queued.
    pub fn next_tick(&self, f: impl FnOnce() + 'static) {
        self.queue_job(f);
    }

    /// Run queued jobs until the queue is empty, returning how many ran.
    ///
    /// Jobs queued while flushing run in the same flush. A flush started from
    /// inside a job does nothing and returns 0.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }
        let _guard = FlushGuard(&self.inner.flushing);

        let mut ran = 0;
        loop {
            // Borrow ends before the job runs, so jobs can queue more jobs
            let Some(job) = self.inner.jobs.borrow_mut().pop_front() else {
                break;
            };
            job();
            ran += 1;
        }

        if ran > 0 {
            tracing::trace!(jobs = ran, "flushed job queue");
        }
        ran
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    /// Whether no jobs are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.len())
            .field("flushing", &self.inner.flushing.get())
            .finish()
    }
}
