//! Pull-based async iteration over a yielding coroutine.
//!
//! An [`AsyncIter`] wraps one coroutine whose body yields any number of
//! values before returning or raising. [`next`](AsyncIter::next) and
//! [`for_each`](AsyncIter::for_each) hand back inert [`Thunk`]s; invoking a
//! thunk runs the next resume segment synchronously and delivers its outcome
//! on a later scheduler turn.
//!
//! The iterator is owned by whichever caller is currently driving it.
//! Driving it again while a resume step is in flight — including while the
//! coroutine is parked in the limiter's queue — is a caller error and fails
//! fast with a panic. Once a resume step has completed, the next step may be
//! initiated even if its deferred delivery has not fired yet; deliveries
//! preserve FIFO order.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::body::Signal;
use crate::coro::Coro;
use crate::error::Error;
use crate::sched::{Sched, Thunk};
use crate::step::Step;

/// Where the iteration stands. Transitions happen as each resume step
/// completes: `NotStarted → Suspended → … → Done | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The body has not run yet.
    NotStarted,
    /// The body is parked at a yield.
    Suspended,
    /// The body returned; further steps are exhausted.
    Done,
    /// The body raised; further steps are exhausted.
    Failed,
}

/// Outcome of one iteration step: a yielded or final value, the body's own
/// error carried verbatim, or [`Error::Exhausted`] past the end.
pub type IterOutcome<Y, R> = Result<Step<Y, R>, Error>;

/// Pull-based iterator over one coroutine.
pub struct AsyncIter<Y, R> {
    inner: Rc<IterInner<Y, R>>,
}

struct IterInner<Y, R> {
    sched: Sched,
    status: Cell<Status>,
    driving: Cell<bool>,
    coro: RefCell<Option<Coro<Y, R>>>,
    release: RefCell<Option<Box<dyn FnOnce(Coro<Y, R>)>>>,
}

impl<Y: 'static, R: 'static> AsyncIter<Y, R> {
    pub(crate) fn new(sched: Sched, coro: Coro<Y, R>, release: Box<dyn FnOnce(Coro<Y, R>)>) -> Self {
        AsyncIter {
            inner: Rc::new(IterInner {
                sched,
                status: Cell::new(Status::NotStarted),
                driving: Cell::new(false),
                coro: RefCell::new(Some(coro)),
                release: RefCell::new(Some(release)),
            }),
        }
    }

    /// Current iteration status.
    pub fn status(&self) -> Status {
        self.inner.status.get()
    }

    /// A thunk for the next step.
    ///
    /// Invoking it resumes the coroutine from its last suspension point (or
    /// starts it), runs synchronously to the next yield, return, or raise,
    /// and delivers the outcome asynchronously:
    ///
    /// - `Ok(Step::Yielded(v))` after a yield,
    /// - `Ok(Step::Complete(r))` after the return,
    /// - `Err(Error::Body(e))` after a raise, `e` untouched,
    /// - `Err(Error::Exhausted)` once `Done` or `Failed` has been reached.
    ///
    /// With [`fire`](Thunk::fire) the step still executes; the outcome is
    /// discarded.
    pub fn next(&self) -> Thunk<IterOutcome<Y, R>> {
        let inner = Rc::clone(&self.inner);
        Thunk::new(self.inner.sched.clone(), move |sched, completion| {
            advance(&inner, Box::new(move |out| completion.send(&sched, out)));
        })
    }

    /// A thunk that drives the iteration to its terminal outcome.
    ///
    /// Invoking it performs the equivalent of repeated [`next`](AsyncIter::next)
    /// steps, calling `visitor` synchronously for each yielded value in yield
    /// order — each call only after the resume step that produced the value
    /// has completed and the previous call has returned — then delivers the
    /// final outcome exactly as a terminal `next` would: `Ok(r)` for a
    /// return, `Err` for a raise or exhaustion.
    pub fn for_each<V>(&self, visitor: V) -> Thunk<Result<R, Error>>
    where
        V: FnMut(Y) + 'static,
    {
        let inner = Rc::clone(&self.inner);
        Thunk::new(self.inner.sched.clone(), move |sched, completion| {
            drive(
                inner,
                visitor,
                Box::new(move |out| completion.send(&sched, out)),
            );
        })
    }
}

/// Runs one resume step, updating status and releasing the coroutine on its
/// terminal transition. `deliver` is invoked exactly once, synchronously once
/// the step's outcome exists.
fn advance<Y: 'static, R: 'static>(
    inner: &Rc<IterInner<Y, R>>,
    deliver: Box<dyn FnOnce(IterOutcome<Y, R>)>,
) {
    match inner.status.get() {
        Status::Done | Status::Failed => {
            deliver(Err(Error::Exhausted));
            return;
        }
        Status::NotStarted | Status::Suspended => {}
    }
    if inner.driving.replace(true) {
        panic!("iterator driven again before the prior resume step completed");
    }

    let coro = inner
        .coro
        .borrow()
        .clone()
        .unwrap_or_else(|| unreachable!("non-terminal iterator always holds its coroutine"));
    let state = Rc::clone(inner);
    coro.enter(
        Signal::Resume,
        Box::new(move |out| {
            state.driving.set(false);
            let mapped = match out {
                Ok(Step::Yielded(v)) => {
                    state.status.set(Status::Suspended);
                    Ok(Step::Yielded(v))
                }
                Ok(Step::Complete(r)) => {
                    state.status.set(Status::Done);
                    finish(&state);
                    Ok(Step::Complete(r))
                }
                Err(e) => {
                    state.status.set(Status::Failed);
                    finish(&state);
                    Err(Error::Body(e))
                }
            };
            deliver(mapped);
        }),
    );
}

/// Hands the coroutine back through the pipeline after its final exit.
fn finish<Y, R>(inner: &Rc<IterInner<Y, R>>) {
    let coro = inner.coro.borrow_mut().take();
    let release = inner.release.borrow_mut().take();
    if let (Some(coro), Some(release)) = (coro, release) {
        release(coro);
    }
}

/// Trampolined step loop behind `for_each`: each subsequent step is deferred
/// onto the scheduler so long sequences do not grow the call stack.
fn drive<Y: 'static, R: 'static, V>(
    inner: Rc<IterInner<Y, R>>,
    mut visitor: V,
    done: Box<dyn FnOnce(Result<R, Error>)>,
) where
    V: FnMut(Y) + 'static,
{
    let state = Rc::clone(&inner);
    advance(
        &inner,
        Box::new(move |out| match out {
            Ok(Step::Yielded(v)) => {
                visitor(v);
                let sched = state.sched.clone();
                sched.defer(move || drive(state, visitor, done));
            }
            Ok(Step::Complete(r)) => done(Ok(r)),
            Err(e) => done(Err(e)),
        }),
    );
}
