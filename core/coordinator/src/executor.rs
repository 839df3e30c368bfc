//! The dispatcher seam the coordinator drives queries through.

use async_trait::async_trait;

use tally_dispatch::DispatchError;
use tally_dispatch::DispatchRequest;
use tally_dispatch::Dispatcher;
use tally_dispatch::ExecuteOptions;
use tally_pool::QueryOutcome;

/// Executes sets of aggregation requests.
///
/// Implemented by [`Dispatcher`] in production; tests substitute scripted
/// executors.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `requests`, returning one outcome per request in input order.
    async fn execute(
        &self,
        requests: Vec<DispatchRequest>,
        options: ExecuteOptions,
    ) -> std::result::Result<Vec<QueryOutcome>, DispatchError>;
}

#[async_trait]
impl QueryExecutor for Dispatcher {
    async fn execute(
        &self,
        requests: Vec<DispatchRequest>,
        options: ExecuteOptions,
    ) -> std::result::Result<Vec<QueryOutcome>, DispatchError> {
        self.execute_queries(requests, options)
            .await
            .map(|report| report.results)
    }
}
