//! Error taxonomy for pipeline construction and iteration.

use thiserror::Error;

/// An error raised inside a suspendable body.
///
/// Carried verbatim through the completion channel: the box is moved, never
/// wrapped or re-rendered, so callers can downcast to the original type.
pub type BodyError = Box<dyn std::error::Error + 'static>;

/// Errors produced by this crate's own machinery.
///
/// Construction-time misuse (`Validation`, `Configuration`) is returned
/// synchronously from the factory that detected it. `Exhausted` and `Body`
/// are only ever delivered through a thunk's completion channel.
#[derive(Debug, Error)]
pub enum Error {
    /// A constructor argument was rejected, e.g. a zero semaphore capacity.
    #[error("validation: {0}")]
    Validation(String),

    /// A mod was misused at pipeline construction time, e.g. applying the
    /// concurrency limiter twice.
    #[error("configuration: {0}")]
    Configuration(String),

    /// The iterator was driven past its `Done` or `Failed` state.
    #[error("iteration driven past its final step")]
    Exhausted,

    /// The body raised; the original error is carried untouched.
    #[error("{0}")]
    Body(BodyError),
}

impl Error {
    /// Extracts the body's own error, if this is a [`Error::Body`].
    pub fn into_body(self) -> Option<BodyError> {
        match self {
            Error::Body(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` for [`Error::Exhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::Exhausted)
    }
}
