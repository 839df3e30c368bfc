//! Pool configuration.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSettings {
    /// Number of worker processes. The pool never runs fewer than two.
    #[serde(default = "default_worker_count")]
    pub worker_count: i32,

    /// How long a worker may take to report `READY` after `INIT`.
    #[serde(default = "default_worker_init_timeout_ms")]
    pub worker_init_timeout_ms: i64,

    /// Grace period between `SHUTDOWN` and force-kill.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: i64,

    /// Database connection string handed to each worker.
    pub connection_string: String,

    /// Database name handed to each worker.
    pub database_name: String,

    /// Driver options handed to each worker verbatim.
    #[serde(default)]
    pub database_options: Value,
}

fn default_worker_count() -> i32 {
    2
}
fn default_worker_init_timeout_ms() -> i64 {
    30_000
}
fn default_shutdown_grace_ms() -> i64 {
    5_000
}

impl PoolSettings {
    /// Build settings with defaults for everything but the database target.
    pub fn new(connection_string: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            worker_count: default_worker_count(),
            worker_init_timeout_ms: default_worker_init_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            connection_string: connection_string.into(),
            database_name: database_name.into(),
            database_options: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the worker count.
    pub fn with_worker_count(mut self, worker_count: i32) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the init timeout in milliseconds.
    pub fn with_worker_init_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.worker_init_timeout_ms = timeout_ms;
        self
    }

    /// Worker count with the two-worker floor applied.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count < 2 {
            tracing::warn!(
                requested = self.worker_count,
                "Worker count below the minimum of 2; clamping"
            );
        }
        self.worker_count.max(2) as usize
    }
}
