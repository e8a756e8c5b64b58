//! Common result and error types for the weft router.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in weft or an
/// impossible configuration), not a failure to route. Unroutable designs are
/// reported through the router's boolean success contract, never through
/// this type.
pub type WeftResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug or an invalid configuration.
#[derive(Debug, thiserror::Error)]
#[error("internal router error: {message}")]
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
