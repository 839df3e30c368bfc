//! Process pool for aggregation workers.
//!
//! The pool forks worker processes, monitors and restarts them, assigns
//! query batches round-robin across ready workers, and tracks per-worker
//! and aggregate statistics. Workers are isolated OS processes speaking
//! newline-framed JSON over stdio, so a crash in one cannot corrupt its
//! peers or the parent.

mod error;
mod outcome;
mod pending;
mod pool;
mod settings;
mod stats;
mod worker;

pub use error::PoolError;
pub use error::Result;
pub use outcome::QueryOutcome;
pub use pool::ProcessPool;
pub use settings::PoolSettings;
pub use stats::PoolStatsSnapshot;
pub use stats::WorkerStatsSnapshot;
pub use worker::ProcessSpawner;
pub use worker::WorkerExit;
pub use worker::WorkerLink;
pub use worker::WorkerSpawner;
