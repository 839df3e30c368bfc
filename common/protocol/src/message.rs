//! Message variants exchanged between the pool and a worker process.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// One aggregation request addressed to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Request identifier, unique among in-flight requests.
    pub id: String,
    /// Target collection.
    pub collection_name: String,
    /// Aggregation pipeline stages.
    pub query: Vec<Value>,
    /// Driver options passed through verbatim.
    #[serde(default)]
    pub options: Value,
}

/// Error payload carried across the process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    /// Error class name (e.g. `MongoError`, `TimeoutError`).
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Optional stack or backtrace text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl WireError {
    /// Build an error payload with the given class name and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

/// Per-query execution metrics reported by a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    /// Wall time of the database round-trip, in milliseconds.
    pub query_time: f64,
    /// Serialized request size in bytes (debug only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_size: Option<i64>,
    /// Serialized result size in bytes (debug only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size: Option<i64>,
}

/// Outcome of one request, mirrored inside batch replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Identifier of the request this result answers.
    pub id: String,
    /// Result documents, or `None` on failure.
    pub result: Option<Vec<Value>>,
    /// Failure description, or `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    /// Execution metrics.
    #[serde(default)]
    pub metrics: QueryMetrics,
}

/// A protocol message. The `type` field discriminates variants on the wire;
/// unknown fields inside a variant are tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Open the database client. First message a worker receives.
    #[serde(rename_all = "camelCase")]
    Init {
        /// Database connection string.
        connection_string: String,
        /// Database to address.
        database_name: String,
        /// Driver/tuning options, passed through as a JSON object.
        #[serde(default)]
        database_options: Value,
    },
    /// Worker acknowledgement that initialization succeeded.
    Ready,
    /// Run a single aggregation.
    Query(QueryRequest),
    /// Run a batch of aggregations, replying once.
    #[serde(rename_all = "camelCase")]
    QueryBatch {
        /// Batch identifier.
        batch_id: String,
        /// Requests executed in order.
        requests: Vec<QueryRequest>,
    },
    /// Reply to [`Message::Query`].
    Result(QueryResult),
    /// Reply to [`Message::QueryBatch`], results in request order.
    #[serde(rename_all = "camelCase")]
    ResultBatch {
        /// Identifier of the batch being answered.
        batch_id: String,
        /// Per-request outcomes.
        results: Vec<QueryResult>,
    },
    /// Initialization failure. The worker exits non-zero after sending it.
    Error {
        /// Failure description.
        message: String,
    },
    /// Close the database client and exit zero.
    Shutdown,
}

#[cfg(test)]
#[path = "message.test.rs"]
mod tests;
