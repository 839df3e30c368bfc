//! Error types for protocol encoding and framing.

use thiserror::Error;

/// Protocol error type.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A line on the channel was not a valid protocol message.
    #[error("Invalid message: {cause}")]
    InvalidMessage {
        /// The decode failure.
        cause: String,
    },

    /// A pipeline stage was not a JSON object.
    #[error("Pipeline stage {index} is not an object")]
    InvalidStage {
        /// Zero-based stage position.
        index: usize,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error on the channel.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
