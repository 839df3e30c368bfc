//! The dispatcher itself.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::error::Result;
use crate::request::DispatchRequest;
use crate::request::ExecuteOptions;
use crate::request::ExecuteReport;
use crate::request::ExecuteSummary;
use tally_pool::PoolError;
use tally_pool::ProcessPool;
use tally_pool::QueryOutcome;
use tally_protocol::QueryRequest;
use tally_protocol::WireError;

/// Rolling totals across all `execute_queries` calls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStatsSnapshot {
    /// Requests accepted over the dispatcher's lifetime.
    pub total_queries: i64,
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
    /// Most recent error message, if any.
    pub last_error: Option<String>,
}

/// Facade that validates, distributes and accounts for query batches.
pub struct Dispatcher {
    pool: Arc<ProcessPool>,
    totals: Mutex<DispatcherStatsSnapshot>,
}

impl Dispatcher {
    /// Build a dispatcher over a started pool.
    pub fn new(pool: Arc<ProcessPool>) -> Self {
        Self {
            pool,
            totals: Mutex::new(DispatcherStatsSnapshot::default()),
        }
    }

    /// The pool this dispatcher routes into.
    pub fn pool(&self) -> &Arc<ProcessPool> {
        &self.pool
    }

    /// Execute a set of aggregation requests.
    ///
    /// Requests are validated up front (configuration errors are raised, not
    /// returned per-request), then split into `C` contiguous chunks where
    /// `C = max(1, min(ready workers, max_concurrency, requests))`, each
    /// chunk going to the next round-robin worker. Results preserve input
    /// order; one failing request or batch never prevents its peers from
    /// completing. With zero ready workers the call fails immediately —
    /// there is no internal queue.
    pub async fn execute_queries(
        &self,
        requests: Vec<DispatchRequest>,
        options: ExecuteOptions,
    ) -> Result<ExecuteReport> {
        let normalized = normalize(requests)?;
        if normalized.is_empty() {
            return Ok(ExecuteReport {
                results: Vec::new(),
                summary: ExecuteSummary::default(),
            });
        }

        let ready = self.pool.ready_workers().await.len();
        if ready == 0 {
            let error = match self.pool.next_ready_worker().await {
                Err(e) => e,
                Ok(_) => PoolError::NoReadyWorkers,
            };
            return Err(DispatchError::Pool(error));
        }

        let total = normalized.len();
        let concurrency = total
            .min(ready)
            .min(options.max_concurrency.max(1) as usize)
            .max(1);
        let chunk_size = total.div_ceil(concurrency);
        let timeout = Duration::from_millis(options.timeout_ms.max(1) as u64);

        tracing::debug!(
            requests = total,
            ready_workers = ready,
            concurrency = concurrency,
            chunk_size = chunk_size,
            "Dispatching query batch"
        );

        let chunks: Vec<Vec<QueryRequest>> = normalized
            .chunks(chunk_size)
            .map(<[QueryRequest]>::to_vec)
            .collect();
        let tasks = chunks
            .into_iter()
            .map(|chunk| self.run_chunk(chunk, timeout));
        let outcomes: Vec<QueryOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .flatten()
            .collect();

        let summary = self.account(&outcomes).await;
        Ok(ExecuteReport {
            results: outcomes,
            summary,
        })
    }

    /// Rolling totals snapshot.
    pub async fn stats(&self) -> DispatcherStatsSnapshot {
        self.totals.lock().await.clone()
    }

    /// Reset the rolling totals.
    pub async fn reset_stats(&self) {
        *self.totals.lock().await = DispatcherStatsSnapshot::default();
    }

    /// Run one chunk on the next round-robin worker. Transport-level
    /// failures fail only this chunk's requests, as error results.
    async fn run_chunk(&self, chunk: Vec<QueryRequest>, timeout: Duration) -> Vec<QueryOutcome> {
        let worker = match self.pool.next_ready_worker().await {
            Ok(worker) => worker,
            Err(e) => return fail_chunk(&chunk, &e),
        };
        match self
            .pool
            .execute_batch_on_worker(worker, chunk.clone(), timeout)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => fail_chunk(&chunk, &e),
        }
    }

    async fn account(&self, outcomes: &[QueryOutcome]) -> ExecuteSummary {
        let mut summary = ExecuteSummary {
            total: outcomes.len() as i64,
            ..ExecuteSummary::default()
        };
        let mut last_error = None;
        for outcome in outcomes {
            if outcome.is_success() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
                if let Some(error) = &outcome.error {
                    last_error = Some(error.message.clone());
                }
            }
            summary.total_query_time += outcome.metrics.query_time;
            summary.total_query_size += outcome.metrics.query_size.unwrap_or(0);
            summary.total_result_size += outcome.metrics.result_size.unwrap_or(0);
        }

        let mut totals = self.totals.lock().await;
        totals.total_queries += summary.total;
        totals.successful += summary.successful;
        totals.failed += summary.failed;
        totals.total_query_time += summary.total_query_time;
        totals.total_query_size += summary.total_query_size;
        totals.total_result_size += summary.total_result_size;
        if last_error.is_some() {
            totals.last_error = last_error;
        }
        summary
    }
}

/// Validate requests and assign ids where absent.
fn normalize(requests: Vec<DispatchRequest>) -> Result<Vec<QueryRequest>> {
    let mut normalized = Vec::with_capacity(requests.len());
    for (index, request) in requests.into_iter().enumerate() {
        if request.collection_name.trim().is_empty() {
            return Err(DispatchError::InvalidRequest {
                index,
                reason: "collectionName must be a non-empty string".to_string(),
            });
        }
        let stages = match request.query {
            serde_json::Value::Array(stages) => stages,
            _ => {
                return Err(DispatchError::InvalidRequest {
                    index,
                    reason: "query must be an array of pipeline stages".to_string(),
                });
            }
        };
        let id = match request.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        normalized.push(QueryRequest {
            id,
            collection_name: request.collection_name,
            query: stages,
            options: request.options,
        });
    }
    Ok(normalized)
}

fn fail_chunk(chunk: &[QueryRequest], error: &PoolError) -> Vec<QueryOutcome> {
    tracing::warn!(requests = chunk.len(), error = %error, "Batch dispatch failed");
    chunk
        .iter()
        .map(|request| {
            QueryOutcome::failure(
                request.id.clone(),
                WireError::new("DispatchError", error.to_string()),
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "dispatcher.test.rs"]
mod tests;
