//! Common result and error types for strata.

/// The result type for operations that can only fail through a logic error.
///
/// `Err` indicates a broken internal invariant (a bug in strata), not a
/// stage failure or a store problem. Those are reported through the
/// pipeline and cache error types.
pub type StrataResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in strata, not a caller problem.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
