//! Convenience re-exports for the common surface.
//!
//! ```rust
//! use coroflow::prelude::*;
//! ```

pub use crate::body::{emit, from_fn, Body, BodyStep, Signal};
pub use crate::coro::Context;
pub use crate::error::{BodyError, Error};
pub use crate::flow::Flow;
pub use crate::iter::{AsyncIter, Status};
pub use crate::limit::limit;
pub use crate::pipeline::{Mod, Pipeline, PipelineExt, Substrate};
pub use crate::sched::{Completion, Thunk};
pub use crate::step::Step;
