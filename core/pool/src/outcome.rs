//! Parent-side outcome of one dispatched request.

use bson::Bson;
use bson::Document;
use tally_protocol::QueryMetrics;
use tally_protocol::QueryResult;
use tally_protocol::WireError;
use tally_protocol::wire_to_bson;

/// Outcome of one request as delivered to callers.
///
/// Result documents have been rematerialized from wire JSON, so date-shaped
/// strings inside them are real BSON timestamps again. Exactly one of
/// `result` and `error` is populated.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Identifier of the request.
    pub id: String,
    /// Result documents, or `None` on failure.
    pub result: Option<Vec<Document>>,
    /// Failure description, or `None` on success.
    pub error: Option<WireError>,
    /// Execution metrics (zeroed for requests that never reached a worker).
    pub metrics: QueryMetrics,
}

impl QueryOutcome {
    /// Build a failure outcome that never reached a worker.
    pub fn failure(id: impl Into<String>, error: WireError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
            metrics: QueryMetrics::default(),
        }
    }

    /// Whether the request succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert a wire result into a delivered outcome.
    ///
    /// A reply that carries neither documents nor an error is normalized to
    /// an empty error so the `result`-xor-`error` invariant holds.
    pub fn from_wire(wire: QueryResult) -> Self {
        let QueryResult {
            id,
            result,
            error,
            metrics,
        } = wire;
        if let Some(error) = error {
            return Self {
                id,
                result: None,
                error: Some(error),
                metrics,
            };
        }
        match result {
            Some(items) => {
                let documents = items
                    .iter()
                    .filter_map(|item| match wire_to_bson(item) {
                        Bson::Document(doc) => Some(doc),
                        other => {
                            tracing::warn!(
                                id = id.as_str(),
                                "Dropping non-document result element: {other:?}"
                            );
                            None
                        }
                    })
                    .collect();
                Self {
                    id,
                    result: Some(documents),
                    error: None,
                    metrics,
                }
            }
            None => Self {
                id: id.clone(),
                result: None,
                error: Some(WireError::new(
                    "WorkerError",
                    format!("worker returned neither result nor error for query {id}"),
                )),
                metrics,
            },
        }
    }
}

#[cfg(test)]
#[path = "outcome.test.rs"]
mod tests;
