//! Pipeline and mod composition around coroutine acquire/release.
//!
//! A pipeline is an ordered chain of mods wrapping the terminal
//! [`Substrate`]. Acquisition returns a coroutine handle synchronously without
//! starting the body; the caller chooses when to enter. Mods wrap by
//! layering: the mod applied last with [`PipelineExt::with`] is outermost, so
//! its logic runs first on acquire, and each layer runs its own release logic
//! before delegating inward.
//!
//! ```rust
//! use coroflow::{emit, limit, Step};
//! use coroflow::body::Signal;
//! use coroflow::pipeline::{Pipeline, PipelineExt, Substrate, ITERATE};
//!
//! # coroflow::limit::reset();
//! let pipeline = Substrate.with(limit(4)?)?;
//! let coro = pipeline.acquire(ITERATE, emit([1], "done"));
//! coro.enter(Signal::Resume, Box::new(|out| {
//!     assert_eq!(out.unwrap(), Step::Yielded(1));
//! }));
//! # Ok::<(), coroflow::Error>(())
//! ```

use std::rc::Rc;

use crate::body::Body;
use crate::coro::Coro;
use crate::error::Error;

/// Name of the protocol driving a coroutine, passed through every layer so a
/// mod can treat different drivers differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol(pub &'static str);

/// Protocol used by the async-iteration front door.
pub const ITERATE: Protocol = Protocol("iterate");

/// One layer of the acquire/release chain, keyed by the coroutine's yield and
/// return types.
pub trait Pipeline<Y, R> {
    /// Returns a coroutine for `body` synchronously, without starting it.
    fn acquire<B>(&self, protocol: Protocol, body: B) -> Coro<Y, R>
    where
        B: Body<Yield = Y, Return = R> + 'static;

    /// Returns the coroutine's resources after its final exit.
    fn release(&self, protocol: Protocol, coro: Coro<Y, R>);
}

impl<Y, R, P> Pipeline<Y, R> for Rc<P>
where
    P: Pipeline<Y, R>,
{
    fn acquire<B>(&self, protocol: Protocol, body: B) -> Coro<Y, R>
    where
        B: Body<Yield = Y, Return = R> + 'static,
    {
        (**self).acquire(protocol, body)
    }

    fn release(&self, protocol: Protocol, coro: Coro<Y, R>) {
        (**self).release(protocol, coro)
    }
}

/// Terminal substrate-backed factory: binds a body to a fresh coroutine on
/// acquire and disposes it on release.
#[derive(Debug, Default, Clone, Copy)]
pub struct Substrate;

impl<Y: 'static, R: 'static> Pipeline<Y, R> for Substrate {
    fn acquire<B>(&self, _protocol: Protocol, body: B) -> Coro<Y, R>
    where
        B: Body<Yield = Y, Return = R> + 'static,
    {
        Coro::live(Box::new(body))
    }

    fn release(&self, _protocol: Protocol, coro: Coro<Y, R>) {
        coro.dispose();
    }
}

/// A composable interceptor: a pure transform from pipeline to pipeline,
/// applied once at construction.
///
/// Wrapping is fallible so that construction-time misuse — a mod that may
/// only be applied once, say — surfaces synchronously as an [`Error`].
pub trait Mod<P> {
    /// The wrapped pipeline type.
    type Pipeline;

    /// Wraps `inner`, yielding the composed pipeline.
    fn wrap(self, inner: P) -> Result<Self::Pipeline, Error>;
}

/// Layering sugar: `pipeline.with(mod)` applies `mod` as the new outermost
/// layer.
pub trait PipelineExt: Sized {
    fn with<M: Mod<Self>>(self, m: M) -> Result<M::Pipeline, Error> {
        m.wrap(self)
    }
}

impl<P> PipelineExt for P {}
