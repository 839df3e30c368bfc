//! Dispatcher request and response shapes.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use tally_pool::QueryOutcome;

/// One aggregation request as submitted by callers.
///
/// `query` must be a JSON array of pipeline stages; a missing or empty `id`
/// is auto-assigned during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Request identifier; auto-assigned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Target collection (non-empty).
    pub collection_name: String,
    /// Aggregation pipeline (array of stages).
    pub query: Value,
    /// Driver options passed through verbatim.
    #[serde(default)]
    pub options: Value,
}

impl DispatchRequest {
    /// Build a request with an auto-assigned id.
    pub fn new(collection_name: impl Into<String>, query: Value) -> Self {
        Self {
            id: None,
            collection_name: collection_name.into(),
            query,
            options: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set an explicit request id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Knobs for one `execute_queries` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// End-to-end timeout per request, from enqueue to completion.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
    /// Upper bound on how many workers the batch fans out to.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: i32,
}

fn default_timeout_ms() -> i64 {
    30_000
}
fn default_max_concurrency() -> i32 {
    8
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl ExecuteOptions {
    /// Set the per-request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the concurrency bound.
    pub fn with_max_concurrency(mut self, max_concurrency: i32) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Aggregated counts and byte/time totals for one batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSummary {
    /// Requests in the batch.
    pub total: i64,
    /// Requests that resolved successfully.
    pub successful: i64,
    /// Requests that resolved with an error.
    pub failed: i64,
    /// Summed query wall time in milliseconds.
    pub total_query_time: f64,
    /// Summed serialized request sizes (where reported).
    pub total_query_size: i64,
    /// Summed serialized result sizes (where reported).
    pub total_result_size: i64,
}

/// Results plus summary for one `execute_queries` call.
#[derive(Debug)]
pub struct ExecuteReport {
    /// Per-request outcomes, in input order.
    pub results: Vec<QueryOutcome>,
    /// Batch totals.
    pub summary: ExecuteSummary,
}
