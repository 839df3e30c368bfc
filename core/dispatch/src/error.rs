//! Error types for the dispatcher.

use thiserror::Error;

/// Dispatcher error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A request failed normalization.
    #[error("Invalid request at index {index}: {reason}")]
    InvalidRequest {
        /// Position of the request in the submitted set.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The pool could not take any work.
    #[error(transparent)]
    Pool(#[from] tally_pool::PoolError),
}

/// Result type alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
