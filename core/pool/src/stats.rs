//! Pool statistics.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use serde::Serialize;

/// Aggregate counters owned by the pool. Monotonic; increments are never
/// lost but need not be strictly serialized with each other.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    dispatched: AtomicI64,
    succeeded: AtomicI64,
    failed: AtomicI64,
    restarted_workers: AtomicI64,
}

impl PoolStats {
    pub(crate) fn record_dispatched(&self, count: i64) {
        self.dispatched.fetch_add(count, Ordering::AcqRel);
    }

    pub(crate) fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_restart(&self) {
        self.restarted_workers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dispatched(&self) -> i64 {
        self.dispatched.load(Ordering::Acquire)
    }

    pub(crate) fn succeeded(&self) -> i64 {
        self.succeeded.load(Ordering::Acquire)
    }

    pub(crate) fn failed(&self) -> i64 {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn restarted_workers(&self) -> i64 {
        self.restarted_workers.load(Ordering::Acquire)
    }
}

/// Point-in-time view of one worker slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatsSnapshot {
    /// Stable slot number.
    pub index: usize,
    /// Whether the worker currently accepts work.
    pub ready: bool,
    /// Queries dispatched to this worker.
    pub query_count: i64,
    /// Queries that resolved with an error (including timeouts).
    pub error_count: i64,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatsSnapshot {
    /// Requests handed to workers over the pool's lifetime.
    pub dispatched: i64,
    /// Requests that resolved successfully.
    pub succeeded: i64,
    /// Requests that resolved with an error.
    pub failed: i64,
    /// Workers restarted after an unexpected exit.
    pub restarted_workers: i64,
    /// Workers currently in the roster.
    pub active_workers: i64,
    /// Requests currently awaiting results.
    pub pending_queries: i64,
    /// Per-worker counters.
    pub workers: Vec<WorkerStatsSnapshot>,
}
