//! The aggregation worker process.
//!
//! A worker owns its own database client and executes aggregation pipelines
//! on behalf of the pool, speaking newline-framed JSON over stdio: `INIT`
//! opens the client, `QUERY`/`QUERY_BATCH` run pipelines, `SHUTDOWN` (or a
//! closed stdin) ends the process. Any uncaught failure terminates the
//! process; the parent detects the exit and restarts it.

mod error;
mod runtime;

pub use error::Result;
pub use error::WorkerError;
pub use runtime::run;
