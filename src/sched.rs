//! Cooperative deferral: the boundary between a synchronous resume segment
//! and the asynchronous delivery of its outcome.
//!
//! Work runs in turns. Invoking a [`Thunk`] executes its synchronous segment
//! immediately — side effects up to the first suspension point are visible
//! when the call returns — while the outcome is pushed onto the scheduler's
//! queue and delivered on a later turn, strictly after the invoking call has
//! returned. Start and completion notification are never conflated.
//!
//! ```rust
//! use coroflow::sched::{Sched, Thunk};
//!
//! let sched = Sched::new();
//! let thunk = Thunk::new(sched.clone(), |sched, completion| {
//!     // synchronous segment runs here
//!     completion.send(&sched, 42);
//! });
//! sched.run(|| thunk.call(|v| assert_eq!(v, 42)));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

type Task = Box<dyn FnOnce()>;

/// Handle to a single-threaded FIFO of deferred tasks.
///
/// Clones share the queue. Draining is re-entrancy guarded: a `drain` from
/// inside a running task is a no-op, the outer loop picks the new tasks up.
pub struct Sched {
    inner: Rc<SchedInner>,
}

struct SchedInner {
    queue: RefCell<VecDeque<Task>>,
    draining: Cell<bool>,
}

impl Clone for Sched {
    fn clone(&self) -> Self {
        Sched {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for Sched {
    fn default() -> Self {
        Self::new()
    }
}

impl Sched {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Sched {
            inner: Rc::new(SchedInner {
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
            }),
        }
    }

    /// Parks `task` for a later turn.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Runs parked tasks in FIFO order until the queue is empty, including
    /// tasks parked while draining.
    pub fn drain(&self) {
        if self.inner.draining.replace(true) {
            return;
        }
        loop {
            let task = self.inner.queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        self.inner.draining.set(false);
    }

    /// Executes `f`, then drains the queue.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let value = f();
        self.drain();
        value
    }

    /// Number of parked tasks.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }
}

/// How a thunk's outcome should be handled: explicitly discarded, or
/// delivered to a callback on a later turn.
///
/// An explicit variant, not an optional parameter: fire-and-forget is a
/// deliberate choice, never an accident of arity.
pub enum Completion<T> {
    /// Run the work, drop the outcome.
    Discard,
    /// Deliver the outcome to the callback, strictly after the invoking call
    /// returns.
    Deliver(Box<dyn FnOnce(T)>),
}

impl<T: 'static> Completion<T> {
    /// Builds a delivering completion.
    pub fn deliver(f: impl FnOnce(T) + 'static) -> Self {
        Completion::Deliver(Box::new(f))
    }

    /// Routes `value` according to the variant, deferring any delivery.
    pub fn send(self, sched: &Sched, value: T) {
        match self {
            Completion::Discard => {
                trace!("outcome discarded");
            }
            Completion::Deliver(f) => {
                trace!("outcome deferred for delivery");
                sched.defer(move || f(value));
            }
        }
    }
}

/// A deferred, single-shot unit of work: inert until invoked, consumed by the
/// invocation.
///
/// The task receives the scheduler and the caller's [`Completion`]; it must
/// route exactly one outcome through it (or honor `Discard`).
pub struct Thunk<T> {
    sched: Sched,
    task: Box<dyn FnOnce(Sched, Completion<T>)>,
}

impl<T: 'static> Thunk<T> {
    /// Wraps `task` as an inert thunk on `sched`.
    pub fn new(sched: Sched, task: impl FnOnce(Sched, Completion<T>) + 'static) -> Self {
        Thunk {
            sched,
            task: Box::new(task),
        }
    }

    /// Invokes the thunk with an explicit completion.
    pub fn start(self, completion: Completion<T>) {
        let sched = self.sched.clone();
        (self.task)(sched, completion);
    }

    /// Fire-and-forget: the work runs, the outcome is dropped.
    pub fn fire(self) {
        self.start(Completion::Discard);
    }

    /// Invokes the thunk, delivering the outcome to `f` on a later turn.
    pub fn call(self, f: impl FnOnce(T) + 'static) {
        self.start(Completion::deliver(f));
    }
}
