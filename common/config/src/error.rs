//! Error types for counter configuration.

use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("Counter config file not found: {0}")]
    FileNotFound(String),

    /// Invalid JSON in a configuration file.
    #[error("Invalid JSON in {file}: {error}")]
    InvalidJson {
        /// The file path.
        file: String,
        /// The error message.
        error: String,
    },

    /// A counter definition failed validation.
    #[error("Invalid counter definition at index {index}: {reason}")]
    InvalidCounter {
        /// Position of the definition in the loaded array.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Two definitions share a name inside one index-type namespace.
    #[error("Duplicate counter '{name}' in index type '{index_type}'")]
    DuplicateCounter {
        /// The index-type namespace.
        index_type: String,
        /// The colliding counter name.
        name: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
