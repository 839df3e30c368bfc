//! Error types for the worker pool.

use thiserror::Error;

/// Pool error type.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Spawning the worker process failed.
    #[error("Failed to spawn worker {index}: {cause}")]
    SpawnFailed {
        /// Worker slot number.
        index: usize,
        /// The spawn failure.
        cause: String,
    },

    /// The worker reported an initialization error or died before `READY`.
    #[error("Worker {index} failed to initialize: {cause}")]
    WorkerInit {
        /// Worker slot number.
        index: usize,
        /// The initialization failure.
        cause: String,
    },

    /// The worker did not acknowledge `INIT` within the init timeout.
    #[error("Worker {index} did not become ready in time")]
    InitTimeout {
        /// Worker slot number.
        index: usize,
    },

    /// The pool came up with zero live workers.
    #[error("Pool is not initialized: {cause}")]
    NotInitialized {
        /// What went wrong during startup.
        cause: String,
    },

    /// No worker is ready to take work.
    #[error("No ready workers available")]
    NoReadyWorkers,

    /// The addressed worker is not in the ready roster.
    #[error("Worker {index} is not ready")]
    WorkerNotReady {
        /// Worker slot number.
        index: usize,
    },

    /// The pool is shutting down and admits no new work.
    #[error("Pool is shutting down")]
    ShuttingDown,
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
