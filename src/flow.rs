//! Front door: a pipeline plus a scheduler, and the iterable-protocol
//! wrapper that turns a body into a callable producing [`AsyncIter`]s.
//!
//! ```rust
//! use coroflow::{emit, limit, Flow};
//! use coroflow::pipeline::{PipelineExt, Substrate};
//!
//! # coroflow::limit::reset();
//! let flow = Flow::new(Substrate.with(limit(8)?)?);
//! let iter = flow.iterate(emit([111, 222], "done"));
//!
//! flow.run(|| {
//!     iter.for_each(|v| println!("got {v}"))
//!         .call(|out| assert_eq!(out.unwrap(), "done"));
//! });
//! # Ok::<(), coroflow::Error>(())
//! ```

use std::rc::Rc;

use crate::body::Body;
use crate::coro::Context;
use crate::iter::AsyncIter;
use crate::pipeline::{Pipeline, ITERATE};
use crate::sched::Sched;

/// A pipeline bound to a scheduler. Cheap to clone; clones share both.
pub struct Flow<P> {
    sched: Sched,
    pipeline: Rc<P>,
}

impl<P> Clone for Flow<P> {
    fn clone(&self) -> Self {
        Flow {
            sched: self.sched.clone(),
            pipeline: Rc::clone(&self.pipeline),
        }
    }
}

impl<P> Flow<P> {
    /// Binds `pipeline` to a fresh scheduler.
    pub fn new(pipeline: P) -> Self {
        Flow {
            sched: Sched::new(),
            pipeline: Rc::new(pipeline),
        }
    }

    /// The scheduler driving deferred deliveries.
    pub fn sched(&self) -> &Sched {
        &self.sched
    }

    /// Executes `f`, then drains deferred deliveries.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        self.sched.run(f)
    }

    /// Starts an iteration over `body` with an empty context bag.
    ///
    /// Acquisition is synchronous and does not run the body; under a
    /// concurrency limiter the returned iterator may hold a placeholder
    /// whose first step waits for a slot.
    pub fn iterate<B>(&self, body: B) -> AsyncIter<B::Yield, B::Return>
    where
        B: Body + 'static,
        B::Yield: 'static,
        B::Return: 'static,
        P: Pipeline<B::Yield, B::Return> + 'static,
    {
        self.iterate_in(Context::new(), body)
    }

    /// Starts an iteration over `body` with an explicit call-context.
    ///
    /// The context is attached before the first enter, so the body observes
    /// it from its first segment onward — identically for placeholder and
    /// directly-live coroutines.
    pub fn iterate_in<B>(&self, context: Context, body: B) -> AsyncIter<B::Yield, B::Return>
    where
        B: Body + 'static,
        B::Yield: 'static,
        B::Return: 'static,
        P: Pipeline<B::Yield, B::Return> + 'static,
    {
        let coro = self.pipeline.acquire(ITERATE, body);
        coro.with_context_mut(|cx| cx.absorb(context));
        let pipeline = Rc::clone(&self.pipeline);
        AsyncIter::new(
            self.sched.clone(),
            coro,
            Box::new(move |coro| pipeline.release(ITERATE, coro)),
        )
    }

    /// Wraps a body factory into a reusable callable: invoking it builds a
    /// body from the arguments and synchronously returns its iterator.
    pub fn wrap<F>(&self, factory: F) -> Wrapped<P, F> {
        Wrapped {
            flow: self.clone(),
            factory,
        }
    }
}

/// A wrapped suspendable callable. Built by [`Flow::wrap`].
///
/// [`call`](Wrapped::call) is plain invocation with an ambient (empty)
/// context; [`call_in`](Wrapped::call_in) is explicit-context invocation.
/// Apart from the bound context the two behave identically.
pub struct Wrapped<P, F> {
    flow: Flow<P>,
    factory: F,
}

impl<P, F> Wrapped<P, F> {
    /// Plain invocation.
    pub fn call<A, B>(&self, args: A) -> AsyncIter<B::Yield, B::Return>
    where
        F: Fn(A) -> B,
        B: Body + 'static,
        B::Yield: 'static,
        B::Return: 'static,
        P: Pipeline<B::Yield, B::Return> + 'static,
    {
        self.call_in(Context::new(), args)
    }

    /// Explicit-context invocation.
    pub fn call_in<A, B>(&self, context: Context, args: A) -> AsyncIter<B::Yield, B::Return>
    where
        F: Fn(A) -> B,
        B: Body + 'static,
        B::Yield: 'static,
        B::Return: 'static,
        P: Pipeline<B::Yield, B::Return> + 'static,
    {
        self.flow.iterate_in(context, (self.factory)(args))
    }
}
