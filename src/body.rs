//! The suspendable-body seam.
//!
//! A body is modelled as an explicit continuation: a state machine whose
//! [`resume`](Body::resume) runs synchronously to the next yield, return, or
//! raise. Suspension is the gap between two `resume` calls, owned by the
//! driver, not a captured call stack.
//!
//! # Examples
//!
//! ```rust
//! use coroflow::{emit, Step};
//! use coroflow::body::{Body, Signal};
//! use coroflow::coro::Context;
//!
//! let mut body = emit([111, 222], "done");
//! let mut cx = Context::new();
//! assert_eq!(body.resume(&mut cx, Signal::Resume).unwrap(), Step::Yielded(111));
//! assert_eq!(body.resume(&mut cx, Signal::Resume).unwrap(), Step::Yielded(222));
//! assert_eq!(body.resume(&mut cx, Signal::Resume).unwrap(), Step::Complete("done"));
//! ```

use crate::coro::Context;
use crate::error::BodyError;
use crate::step::Step;

/// Outcome of a single resume: a [`Step`] or a raised error.
pub type BodyStep<Y, R> = Result<Step<Y, R>, BodyError>;

/// What the driver sends into a suspension point.
#[derive(Debug)]
pub enum Signal {
    /// Start the body, or continue it past its last yield.
    Resume,
    /// Deliver an error at the suspension point. Bodies that do not handle
    /// faults propagate them as their own raise.
    Fault(BodyError),
}

impl Signal {
    /// Treats the signal as plain continuation, propagating a fault.
    ///
    /// The common first line of a body that does not recover from injected
    /// errors: `signal.propagate()?;`.
    pub fn propagate(self) -> Result<(), BodyError> {
        match self {
            Signal::Resume => Ok(()),
            Signal::Fault(e) => Err(e),
        }
    }
}

/// A suspendable body, driven one resume at a time.
///
/// Each call to [`resume`](Body::resume) runs the body synchronously until it
/// yields an intermediate value, returns its final value, or raises. The
/// context bag `cx` is the coroutine's, bound before the first resume.
pub trait Body {
    /// Type of intermediate values emitted at suspension points.
    type Yield;
    /// Type of the final value.
    type Return;

    /// Run to the next yield, return, or raise.
    fn resume(&mut self, cx: &mut Context, signal: Signal) -> BodyStep<Self::Yield, Self::Return>;
}

impl<Y, R> Body for Box<dyn Body<Yield = Y, Return = R>> {
    type Yield = Y;
    type Return = R;

    fn resume(&mut self, cx: &mut Context, signal: Signal) -> BodyStep<Y, R> {
        (**self).resume(cx, signal)
    }
}

impl<L, R> Body for either::Either<L, R>
where
    L: Body,
    R: Body<Yield = L::Yield, Return = L::Return>,
{
    type Yield = L::Yield;
    type Return = L::Return;

    fn resume(&mut self, cx: &mut Context, signal: Signal) -> BodyStep<Self::Yield, Self::Return> {
        match self {
            either::Either::Left(l) => l.resume(cx, signal),
            either::Either::Right(r) => r.resume(cx, signal),
        }
    }
}

/// Body backed by a closure.
///
/// See [`from_fn`].
pub struct FromFn<F>(F);

/// Builds a body from a closure called once per resume.
///
/// ```rust
/// use coroflow::{from_fn, Step};
///
/// let mut calls = 0;
/// let _body = from_fn(move |_cx, signal| {
///     signal.propagate()?;
///     calls += 1;
///     Ok(if calls < 3 { Step::Yielded(calls) } else { Step::Complete("done") })
/// });
/// ```
pub fn from_fn<F, Y, R>(f: F) -> FromFn<F>
where
    F: FnMut(&mut Context, Signal) -> BodyStep<Y, R>,
{
    FromFn(f)
}

impl<F, Y, R> Body for FromFn<F>
where
    F: FnMut(&mut Context, Signal) -> BodyStep<Y, R>,
{
    type Yield = Y;
    type Return = R;

    fn resume(&mut self, cx: &mut Context, signal: Signal) -> BodyStep<Y, R> {
        (self.0)(cx, signal)
    }
}

/// Body that yields each item of an iterator, then completes.
///
/// See [`emit`].
pub struct Emit<I, R> {
    items: I,
    finish: Option<R>,
}

/// Builds a scripted body: yield every item in order, then return `finish`.
///
/// An injected [`Signal::Fault`] is propagated as the body's raise. Resuming
/// after completion is a driver contract violation and panics.
pub fn emit<I, R>(items: I, finish: R) -> Emit<I::IntoIter, R>
where
    I: IntoIterator,
{
    Emit {
        items: items.into_iter(),
        finish: Some(finish),
    }
}

impl<I, R> Body for Emit<I, R>
where
    I: Iterator,
{
    type Yield = I::Item;
    type Return = R;

    fn resume(&mut self, _cx: &mut Context, signal: Signal) -> BodyStep<I::Item, R> {
        signal.propagate()?;
        match self.items.next() {
            Some(item) => Ok(Step::Yielded(item)),
            None => match self.finish.take() {
                Some(finish) => Ok(Step::Complete(finish)),
                None => panic!("body resumed after completion"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Injected;

    impl fmt::Display for Injected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "injected")
        }
    }

    impl std::error::Error for Injected {}

    #[test]
    fn test_emit_yields_then_completes() {
        let mut body = emit(vec![1, 2], "done");
        let mut cx = Context::new();

        assert_eq!(
            body.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Yielded(1)
        );
        assert_eq!(
            body.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Yielded(2)
        );
        assert_eq!(
            body.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Complete("done")
        );
    }

    #[test]
    #[should_panic(expected = "body resumed after completion")]
    fn test_emit_panics_past_completion() {
        let mut body = emit(Vec::<i32>::new(), ());
        let mut cx = Context::new();
        let _ = body.resume(&mut cx, Signal::Resume);
        let _ = body.resume(&mut cx, Signal::Resume);
    }

    #[test]
    fn test_emit_propagates_injected_fault() {
        let mut body = emit(vec![1], "done");
        let mut cx = Context::new();

        let out = body.resume(&mut cx, Signal::Fault(Box::new(Injected)));
        assert!(out.unwrap_err().downcast::<Injected>().is_ok());
    }

    #[test]
    fn test_from_fn_can_recover_from_fault() {
        let mut body = from_fn(|_cx, signal: Signal| {
            Ok(match signal {
                Signal::Resume => Step::Yielded("plain"),
                Signal::Fault(_) => Step::Complete("recovered"),
            })
        });
        let mut cx = Context::new();

        assert_eq!(
            body.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Yielded("plain")
        );
        assert_eq!(
            body.resume(&mut cx, Signal::Fault(Box::new(Injected)))
                .unwrap(),
            Step::Complete("recovered")
        );
    }

    #[test]
    fn test_from_fn_reads_context() {
        let mut body = from_fn(|cx: &mut Context, signal: Signal| {
            signal.propagate()?;
            let who = cx.get("who").and_then(|v| v.as_str()).unwrap_or("nobody");
            Ok(Step::Complete::<(), String>(who.to_string()))
        });

        let mut cx = Context::new();
        cx.insert("who", "tester");
        assert_eq!(
            body.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Complete("tester".to_string())
        );
    }

    #[test]
    fn test_either_dispatches_to_active_variant() {
        type B = either::Either<Emit<std::vec::IntoIter<i32>, &'static str>, FromFn<fn(&mut Context, Signal) -> BodyStep<i32, &'static str>>>;

        let mut left: B = either::Either::Left(emit(vec![5], "left"));
        let mut cx = Context::new();
        assert_eq!(
            left.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Yielded(5)
        );

        fn right_body(_cx: &mut Context, _signal: Signal) -> BodyStep<i32, &'static str> {
            Ok(Step::Complete("right"))
        }
        let mut right: B = either::Either::Right(from_fn(
            right_body as fn(&mut Context, Signal) -> BodyStep<i32, &'static str>,
        ));
        assert_eq!(
            right.resume(&mut cx, Signal::Resume).unwrap(),
            Step::Complete("right")
        );
    }
}
