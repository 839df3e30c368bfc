//! Query dispatcher: the facade callers use to run sets of aggregations.
//!
//! Validates requests, distributes them in contiguous chunks across the
//! currently-ready workers, preserves input order in the returned results,
//! and keeps rolling totals for observability endpoints.

mod dispatcher;
mod error;
mod request;

pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherStatsSnapshot;
pub use error::DispatchError;
pub use error::Result;
pub use request::DispatchRequest;
pub use request::ExecuteOptions;
pub use request::ExecuteReport;
pub use request::ExecuteSummary;
