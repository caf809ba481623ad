//! Coroutine handles and their context bag.
//!
//! A [`Coro`] is one in-flight invocation of a suspendable body. The handle is
//! cheap to clone and dispatches through a tagged state machine:
//!
//! - `Pending` — a placeholder issued by the concurrency limiter before a slot
//!   is free; it carries the context attached so far and a one-shot binder
//!   that performs the real acquisition.
//! - `Live` — bound to a body; `enter` runs one resume synchronously.
//! - `Disposed` — released back through the pipeline.
//!
//! Ownership follows the pipeline contract: the pipeline owns a coroutine
//! while inactive; between acquire and release the driving component owns it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::body::{Body, BodyStep, Signal};
use crate::step::Step;

/// Mutable string-to-value bag attached to a coroutine.
///
/// State attached before the first enter survives the limiter's placeholder
/// hand-off to the real coroutine.
#[derive(Debug, Default, Clone)]
pub struct Context {
    slots: HashMap<String, Value>,
}

impl Context {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous entry under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.slots.insert(key.into(), value.into());
    }

    /// Looks up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    /// Removes and returns a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.slots.remove(key)
    }

    /// Moves every entry of `other` into this bag, overwriting on collision.
    pub fn absorb(&mut self, other: Context) {
        self.slots.extend(other.slots);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

thread_local! {
    static BODY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Whether the current call stack is inside a running body segment.
///
/// The concurrency limiter uses this to tell nested acquisitions (which must
/// bypass the semaphore) from top-level ones.
pub fn in_body() -> bool {
    BODY_DEPTH.with(|d| d.get()) > 0
}

/// RAII frame marking one running body segment.
struct BodyFrame;

impl BodyFrame {
    fn push() -> Self {
        BODY_DEPTH.with(|d| d.set(d.get() + 1));
        BodyFrame
    }
}

impl Drop for BodyFrame {
    fn drop(&mut self) {
        BODY_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

/// Callback receiving the outcome of one enter. Invoked exactly once per
/// enter, possibly later than the enter call when the coroutine is parked in
/// the limiter's queue.
pub type EnterFn<Y, R> = Box<dyn FnOnce(BodyStep<Y, R>)>;

type DynBody<Y, R> = Box<dyn Body<Yield = Y, Return = R>>;

/// One-shot closure installed by the limiter on a placeholder; performs the
/// real acquisition once a slot is granted, then forwards the pending enter.
pub(crate) type Binder<Y, R> = Box<dyn FnOnce(Coro<Y, R>, Signal, EnterFn<Y, R>)>;

enum CoroState<Y, R> {
    Pending {
        context: Context,
        bind: Option<Binder<Y, R>>,
    },
    Live(Live<Y, R>),
    Disposed,
}

struct Live<Y, R> {
    body: DynBody<Y, R>,
    context: Context,
    in_limiter: bool,
    finished: bool,
}

/// Handle to one coroutine. Clones share the same underlying state.
pub struct Coro<Y, R> {
    state: Rc<RefCell<CoroState<Y, R>>>,
}

impl<Y, R> Clone for Coro<Y, R> {
    fn clone(&self) -> Self {
        Coro {
            state: Rc::clone(&self.state),
        }
    }
}

impl<Y: 'static, R: 'static> Coro<Y, R> {
    /// Creates a coroutine bound to `body`.
    pub(crate) fn live(body: DynBody<Y, R>) -> Self {
        Coro {
            state: Rc::new(RefCell::new(CoroState::Live(Live {
                body,
                context: Context::new(),
                in_limiter: false,
                finished: false,
            }))),
        }
    }

    /// Creates a placeholder whose first enter runs `bind`.
    pub(crate) fn pending(bind: Binder<Y, R>) -> Self {
        Coro {
            state: Rc::new(RefCell::new(CoroState::Pending {
                context: Context::new(),
                bind: Some(bind),
            })),
        }
    }

    /// Resumes the coroutine, or — on a placeholder's first enter — hands off
    /// to the limiter's binder.
    ///
    /// The resume segment runs synchronously inside this call; `done` receives
    /// the outcome exactly once, synchronously for a live coroutine, later for
    /// a placeholder parked in the limiter's queue.
    ///
    /// # Panics
    ///
    /// Panics when entered after the terminal outcome, or re-entered while a
    /// placeholder is still awaiting its slot. Both are driver contract
    /// violations; the iterator layer reports exhaustion as an error before
    /// reaching this point.
    pub fn enter(&self, signal: Signal, done: EnterFn<Y, R>) {
        let pending_bind = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                CoroState::Pending { bind, .. } => match bind.take() {
                    Some(b) => Some(b),
                    None => panic!("coroutine entered while awaiting a limiter slot"),
                },
                CoroState::Live(_) => None,
                CoroState::Disposed => panic!("coroutine entered after release"),
            }
        };

        if let Some(bind) = pending_bind {
            bind(self.clone(), signal, done);
            return;
        }

        // Run the body segment under a borrow, but deliver the outcome after
        // releasing it: the callback may re-enter this coroutine.
        let outcome = {
            let mut state = self.state.borrow_mut();
            let CoroState::Live(live) = &mut *state else {
                unreachable!("checked above")
            };
            if live.finished {
                panic!("coroutine entered after its final outcome");
            }
            let _frame = BodyFrame::push();
            let outcome = live.body.resume(&mut live.context, signal);
            if matches!(outcome, Err(_) | Ok(Step::Complete(_))) {
                live.finished = true;
            }
            outcome
        };
        done(outcome);
    }

    /// Rebinds this placeholder handle to the coroutine `real`, copying the
    /// context accumulated on the placeholder into the real coroutine.
    ///
    /// Later enters on this handle go straight to the adopted body.
    pub(crate) fn adopt(&self, real: Coro<Y, R>) {
        let pending_context = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, CoroState::Disposed) {
                CoroState::Pending { context, .. } => context,
                _ => panic!("adopt on a non-placeholder coroutine"),
            }
        };
        let mut adopted = std::mem::replace(&mut *real.state.borrow_mut(), CoroState::Disposed);
        match &mut adopted {
            CoroState::Live(live) => live.context.absorb(pending_context),
            _ => panic!("adopted coroutine is not live"),
        }
        *self.state.borrow_mut() = adopted;
    }

    /// Closure-based access to the context bag.
    pub fn with_context<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        let state = self.state.borrow();
        match &*state {
            CoroState::Pending { context, .. } => f(context),
            CoroState::Live(live) => f(&live.context),
            CoroState::Disposed => panic!("context accessed after release"),
        }
    }

    /// Closure-based mutable access to the context bag.
    pub fn with_context_mut<T>(&self, f: impl FnOnce(&mut Context) -> T) -> T {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            CoroState::Pending { context, .. } => f(context),
            CoroState::Live(live) => f(&mut live.context),
            CoroState::Disposed => panic!("context accessed after release"),
        }
    }

    /// Marks the coroutine as having entered the limiter's semaphore.
    pub(crate) fn mark_in_limiter(&self) {
        if let CoroState::Live(live) = &mut *self.state.borrow_mut() {
            live.in_limiter = true;
        }
    }

    /// Clears and returns the limiter marker. Clearing before the slot is
    /// freed prevents a double release.
    pub(crate) fn take_limiter_mark(&self) -> bool {
        match &mut *self.state.borrow_mut() {
            CoroState::Live(live) => std::mem::replace(&mut live.in_limiter, false),
            _ => false,
        }
    }

    /// Whether the coroutine holds a limiter slot.
    pub fn in_limiter(&self) -> bool {
        match &*self.state.borrow() {
            CoroState::Live(live) => live.in_limiter,
            _ => false,
        }
    }

    /// Whether the terminal outcome has been produced.
    pub fn is_finished(&self) -> bool {
        match &*self.state.borrow() {
            CoroState::Live(live) => live.finished,
            _ => false,
        }
    }

    /// Drops the body and any remaining state. Called by the terminal
    /// pipeline on release.
    pub(crate) fn dispose(&self) {
        *self.state.borrow_mut() = CoroState::Disposed;
    }
}
