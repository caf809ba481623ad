//! # Coroflow: Coroutine Pipelines With Pull-Based Iteration
//!
//! Suspend a function body mid-execution and drive it from outside: one value
//! at a time through an async iterator, under cross-cutting policies applied
//! as a pipeline of interceptors ("mods").
//!
//! ## Core Pieces
//!
//! - **[`Body`]**: a suspendable body as an explicit continuation — each
//!   [`resume`](Body::resume) runs synchronously to the next yield, return,
//!   or raise, producing a [`Step`].
//! - **[`Pipeline`](pipeline::Pipeline)** and **[`Mod`](pipeline::Mod)**:
//!   ordered interceptors around coroutine acquire/release, wrapping the
//!   terminal [`Substrate`](pipeline::Substrate).
//! - **[`limit`]**: a semaphore-backed mod bounding concurrent top-level
//!   entries; nested calls bypass it, so a suspended outer call can never
//!   deadlock an inner one.
//! - **[`AsyncIter`]**: pull-based iteration — `next` and `for_each` hand
//!   back lazy single-shot [`Thunk`]s whose outcomes arrive strictly after
//!   the invoking call returns.
//!
//! ## Example
//!
//! ```rust
//! use coroflow::{emit, limit, Flow};
//! use coroflow::pipeline::{PipelineExt, Substrate};
//!
//! # coroflow::limit::reset();
//! let flow = Flow::new(Substrate.with(limit(4)?)?);
//! let iter = flow.iterate(emit([111, 222, 333], "done"));
//!
//! flow.run(|| {
//!     iter.for_each(|v| println!("pulled {v}"))
//!         .call(|out| assert_eq!(out.unwrap(), "done"));
//! });
//! # Ok::<(), coroflow::Error>(())
//! ```
//!
//! Concurrency is cooperative interleaving at suspension points, never
//! parallelism: one body segment runs at a time on one scheduler thread.

pub mod body;
pub mod coro;
pub mod error;
pub mod flow;
pub mod iter;
pub mod limit;
pub mod pipeline;
pub mod prelude;
pub mod sched;
pub mod step;

pub use body::{emit, from_fn, Body, BodyStep, Signal};
pub use coro::{Context, Coro};
pub use error::{BodyError, Error};
pub use flow::{Flow, Wrapped};
pub use iter::{AsyncIter, IterOutcome, Status};
pub use limit::{limit, Limit, LimitMod, Semaphore};
pub use sched::{Completion, Sched, Thunk};
pub use step::Step;
