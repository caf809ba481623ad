/// Outcome of one resume of a suspendable body: an intermediate value or the
/// final return.
///
/// `Step` plays the role `Option` plays for optional values: the driving side
/// matches on it after every resume to decide whether to keep pulling.
///
/// # Examples
///
/// ```rust
/// use coroflow::Step;
///
/// let mid: Step<i32, &str> = Step::Yielded(111);
/// let end: Step<i32, &str> = Step::Complete("done");
///
/// assert!(mid.is_yielded());
/// assert_eq!(end.complete(), Some("done"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<Y, R> {
    /// The body suspended after emitting an intermediate value.
    Yielded(Y),
    /// The body ran to completion with a final value.
    Complete(R),
}

impl<Y, R> Step<Y, R> {
    /// Returns `true` if the step is `Yielded`.
    #[inline]
    pub const fn is_yielded(&self) -> bool {
        matches!(self, Step::Yielded(_))
    }

    /// Returns `true` if the step is `Complete`.
    #[inline]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Step::Complete(_))
    }

    /// Converts into the yielded value, discarding a final value.
    #[inline]
    pub fn yielded(self) -> Option<Y> {
        match self {
            Step::Yielded(y) => Some(y),
            Step::Complete(_) => None,
        }
    }

    /// Converts into the final value, discarding a yielded value.
    #[inline]
    pub fn complete(self) -> Option<R> {
        match self {
            Step::Yielded(_) => None,
            Step::Complete(r) => Some(r),
        }
    }

    /// Maps the yielded value, leaving a final value untouched.
    ///
    /// ```rust
    /// use coroflow::Step;
    ///
    /// let s: Step<i32, &str> = Step::Yielded(21);
    /// assert_eq!(s.map_yielded(|v| v * 2), Step::Yielded(42));
    /// ```
    #[inline]
    pub fn map_yielded<Y2, F>(self, f: F) -> Step<Y2, R>
    where
        F: FnOnce(Y) -> Y2,
    {
        match self {
            Step::Yielded(y) => Step::Yielded(f(y)),
            Step::Complete(r) => Step::Complete(r),
        }
    }

    /// Maps the final value, leaving a yielded value untouched.
    #[inline]
    pub fn map_complete<R2, F>(self, f: F) -> Step<Y, R2>
    where
        F: FnOnce(R) -> R2,
    {
        match self {
            Step::Yielded(y) => Step::Yielded(y),
            Step::Complete(r) => Step::Complete(f(r)),
        }
    }

    /// Converts from `&Step<Y, R>` to `Step<&Y, &R>`.
    #[inline]
    pub const fn as_ref(&self) -> Step<&Y, &R> {
        match self {
            Step::Yielded(y) => Step::Yielded(y),
            Step::Complete(r) => Step::Complete(r),
        }
    }

    /// Returns the yielded value.
    ///
    /// # Panics
    ///
    /// Panics if the step is `Complete`.
    #[inline]
    pub fn unwrap_yielded(self) -> Y {
        match self {
            Step::Yielded(y) => y,
            Step::Complete(_) => panic!("called `Step::unwrap_yielded()` on a `Complete` value"),
        }
    }

    /// Returns the final value.
    ///
    /// # Panics
    ///
    /// Panics if the step is `Yielded`.
    #[inline]
    pub fn unwrap_complete(self) -> R {
        match self {
            Step::Yielded(_) => panic!("called `Step::unwrap_complete()` on a `Yielded` value"),
            Step::Complete(r) => r,
        }
    }
}
