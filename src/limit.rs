//! Concurrency limiting for top-level coroutine entries.
//!
//! [`limit`] builds a mod backed by a single [`Semaphore`]. Top-level
//! acquisitions get a placeholder coroutine whose first enter waits for a
//! slot; nested acquisitions — made from inside a running body — bypass the
//! semaphore entirely. A suspended outer coroutine holding a slot while an
//! inner call waits for one would deadlock, so nested calls must never queue.
//!
//! One semaphore exists per scheduler: applying the mod twice is a
//! configuration error. [`reset`] clears the applied flag for test isolation.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::body::Body;
use crate::coro::{self, Coro};
use crate::error::Error;
use crate::pipeline::{Mod, Pipeline, Protocol};

/// Counter-plus-queue structure limiting concurrent holders of a slot.
///
/// Entries parked in the queue are plain callbacks, invoked in FIFO order as
/// slots free up. Single-scheduler cooperative model: no locking, shared by
/// reference through cheap clones.
///
/// ```rust
/// use coroflow::Semaphore;
///
/// let sem = Semaphore::new(1)?;
/// sem.enter(|| println!("first, runs synchronously"));
/// sem.enter(|| println!("second, parked until leave"));
/// assert_eq!(sem.queued(), 1);
/// sem.leave(); // hands the slot to the parked entry
/// # Ok::<(), coroflow::Error>(())
/// ```
pub struct Semaphore {
    state: Rc<RefCell<SemState>>,
}

impl Clone for Semaphore {
    fn clone(&self) -> Self {
        Semaphore {
            state: Rc::clone(&self.state),
        }
    }
}

struct SemState {
    capacity: usize,
    /// Goes negative when `resize` shrinks below the in-use count.
    available: isize,
    queue: VecDeque<Box<dyn FnOnce()>>,
}

impl Semaphore {
    /// Creates a semaphore with `capacity` slots.
    ///
    /// Fails with [`Error::Validation`] unless `capacity` is at least 1.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::Validation(
                "semaphore capacity must be at least 1".into(),
            ));
        }
        Ok(Semaphore {
            state: Rc::new(RefCell::new(SemState {
                capacity,
                available: capacity as isize,
                queue: VecDeque::new(),
            })),
        })
    }

    /// Takes a slot, invoking `entry` synchronously if one is free, else
    /// parking it at the back of the queue.
    pub fn enter(&self, entry: impl FnOnce() + 'static) {
        let granted = {
            let mut state = self.state.borrow_mut();
            if state.available > 0 {
                state.available -= 1;
                Some(entry)
            } else {
                state.queue.push_back(Box::new(entry));
                None
            }
        };
        // Invoke outside the borrow: the entry may re-enter the semaphore.
        match granted {
            Some(entry) => {
                trace!("semaphore slot granted");
                entry();
            }
            None => trace!(queued = self.queued(), "semaphore entry parked"),
        }
    }

    /// Frees one slot. If entries are parked, the oldest receives the slot
    /// directly — no net change to the free count.
    pub fn leave(&self) {
        let handoff = {
            let mut state = self.state.borrow_mut();
            match state.queue.pop_front() {
                Some(entry) => Some(entry),
                None => {
                    state.available += 1;
                    None
                }
            }
        };
        if let Some(entry) = handoff {
            trace!("semaphore slot handed off");
            entry();
        } else {
            trace!("semaphore slot released");
        }
    }

    /// Adjusts the capacity, shifting the free count by the difference.
    ///
    /// Parked entries are not drained here: slots freed by growing surface
    /// only through subsequent [`leave`](Semaphore::leave) calls. Intended to
    /// be set once at startup.
    pub fn resize(&self, capacity: usize) {
        let mut state = self.state.borrow_mut();
        state.available += capacity as isize - state.capacity as isize;
        state.capacity = capacity;
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Currently free slots; negative after shrinking below the in-use count.
    pub fn available(&self) -> isize {
        self.state.borrow().available
    }

    /// Number of parked entries.
    pub fn queued(&self) -> usize {
        self.state.borrow().queue.len()
    }
}

thread_local! {
    static LIMIT_APPLIED: Cell<bool> = const { Cell::new(false) };
}

/// Clears the one-limiter-per-scheduler flag.
///
/// Test isolation only: lets independent tests each apply their own limiter.
pub fn reset() {
    LIMIT_APPLIED.with(|applied| applied.set(false));
}

/// Builds the concurrency-limiting mod.
///
/// Fails with [`Error::Validation`] for a zero capacity. The returned mod
/// fails with [`Error::Configuration`] when applied a second time: the
/// limiter's semaphore is a singleton for the scheduler.
pub fn limit(capacity: usize) -> Result<LimitMod, Error> {
    Ok(LimitMod {
        sem: Semaphore::new(capacity)?,
    })
}

/// The concurrency-limiting mod. Built by [`limit`].
pub struct LimitMod {
    sem: Semaphore,
}

impl LimitMod {
    /// The semaphore backing this mod, for startup-time
    /// [`resize`](Semaphore::resize) or introspection in tests.
    pub fn semaphore(&self) -> Semaphore {
        self.sem.clone()
    }
}

impl<P> Mod<P> for LimitMod {
    type Pipeline = Limit<P>;

    fn wrap(self, inner: P) -> Result<Limit<P>, Error> {
        let already = LIMIT_APPLIED.with(|applied| applied.replace(true));
        if already {
            return Err(Error::Configuration(
                "concurrency limiter already applied to a pipeline".into(),
            ));
        }
        Ok(Limit {
            sem: self.sem,
            inner: Rc::new(inner),
        })
    }
}

/// Pipeline layer produced by [`LimitMod`].
pub struct Limit<P> {
    sem: Semaphore,
    inner: Rc<P>,
}

impl<P> Limit<P> {
    /// The semaphore backing this layer.
    pub fn semaphore(&self) -> Semaphore {
        self.sem.clone()
    }
}

impl<Y, R, P> Pipeline<Y, R> for Limit<P>
where
    Y: 'static,
    R: 'static,
    P: Pipeline<Y, R> + 'static,
{
    fn acquire<B>(&self, protocol: Protocol, body: B) -> Coro<Y, R>
    where
        B: Body<Yield = Y, Return = R> + 'static,
    {
        // Nested calls never wait on the semaphore: the outer coroutine may
        // be holding the only slot.
        if coro::in_body() {
            trace!("nested acquire bypasses the limiter");
            return self.inner.acquire(protocol, body);
        }

        let sem = self.sem.clone();
        let inner = Rc::clone(&self.inner);
        Coro::pending(Box::new(move |placeholder, signal, done| {
            sem.enter(move || {
                let real = inner.acquire(protocol, body);
                placeholder.adopt(real);
                placeholder.mark_in_limiter();
                placeholder.enter(signal, done);
            });
        }))
    }

    fn release(&self, protocol: Protocol, coro: Coro<Y, R>) {
        // Clear the marker before freeing the slot so a re-entrant release
        // cannot free it twice.
        if coro.take_limiter_mark() {
            self.sem.leave();
        }
        self.inner.release(protocol, coro)
    }
}
