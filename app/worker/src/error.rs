//! Error types for the worker process.

use thiserror::Error;

/// Worker error type.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Opening the database client failed.
    #[error("Initialization failed: {cause}")]
    Init {
        /// The connection failure.
        cause: String,
    },

    /// The channel to the parent broke.
    #[error("Channel error: {0}")]
    Channel(#[from] tally_protocol::ProtocolError),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
