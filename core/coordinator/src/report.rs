//! Coordinator result and metrics shapes.

use std::collections::BTreeMap;

use bson::Document;
use serde::Serialize;
use serde_json::Value;

/// Per-index-type execution metrics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexTypeMetrics {
    /// Summed query wall time for this index type, in milliseconds.
    pub query_time: f64,
    /// Summed serialized request sizes (where reported).
    pub query_size: i64,
    /// Summed serialized result sizes (where reported).
    pub result_size: i64,
    /// How many related facts the lookup produced.
    pub relevant_facts_count: i64,
    /// Set when the lookup found nothing and the facet stage was skipped.
    pub no_relevant_facts: bool,
    /// Failure for this index type, if any. Other index types are
    /// unaffected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metrics block of one coordinator run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterMetrics {
    /// Number of index types executed.
    pub counter_index_count: i64,
    /// Related facts found across all index types.
    pub relevant_facts_count: i64,
    /// Per-index-type breakdown.
    pub per_type: BTreeMap<String, IndexTypeMetrics>,
}

/// What one coordinator run returns.
#[derive(Debug, Default)]
pub struct CounterReport {
    /// Merged counter results: counter name → group document. A name
    /// appearing under several index types resolves last-write-wins.
    pub counters: BTreeMap<String, Document>,
    /// Total processing time in milliseconds.
    pub processing_time: f64,
    /// Metrics block.
    pub metrics: CounterMetrics,
    /// Literal pipelines used per index type; populated only in debug mode.
    pub pipelines: Option<BTreeMap<String, Vec<Value>>>,
}
