//! Coordinator configuration.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Hard ceiling on how many historical facts one lookup may consider.
pub const MAX_DEPTH_LIMIT: i64 = 1_000;

/// Default per-index-type lookup limit.
const DEFAULT_PER_TYPE_LIMIT: i64 = 100;

/// Configuration for the counter execution coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSettings {
    /// Collection holding fact documents.
    #[serde(default = "default_facts_collection")]
    pub facts_collection: String,

    /// Collection holding index entries.
    #[serde(default = "default_index_collection")]
    pub index_collection: String,

    /// Upper bound on historical facts per lookup, capped at
    /// [`MAX_DEPTH_LIMIT`].
    #[serde(default = "default_depth_limit")]
    pub depth_limit: i64,

    /// Time floor for relevant index entries.
    #[serde(default)]
    pub depth_from_date: Option<DateTime<Utc>>,

    /// Per-index-type lookup limit; defaults to 100 when absent.
    #[serde(default)]
    pub per_type_limit: Option<i64>,

    /// Run everything on the index collection (requires embedded fact data
    /// in index entries) instead of the two-stage lookup-then-facet plan.
    #[serde(default)]
    pub single_stage: bool,

    /// Exclude the fact being processed from its own counters.
    #[serde(default = "default_true")]
    pub exclude_current_fact: bool,

    /// Include the literal pipelines in the report.
    #[serde(default)]
    pub debug: bool,

    /// Per-query timeout handed to the dispatcher.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: i64,

    /// Concurrency bound handed to the dispatcher.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: i32,
}

fn default_facts_collection() -> String {
    "facts".to_string()
}
fn default_index_collection() -> String {
    "factIndex".to_string()
}
fn default_depth_limit() -> i64 {
    MAX_DEPTH_LIMIT
}
fn default_true() -> bool {
    true
}
fn default_query_timeout_ms() -> i64 {
    30_000
}
fn default_max_concurrency() -> i32 {
    8
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            facts_collection: default_facts_collection(),
            index_collection: default_index_collection(),
            depth_limit: default_depth_limit(),
            depth_from_date: None,
            per_type_limit: None,
            single_stage: false,
            exclude_current_fact: default_true(),
            debug: false,
            query_timeout_ms: default_query_timeout_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl CoordinatorSettings {
    /// The lookup limit actually applied: the per-type limit (default 100)
    /// bounded by the depth limit, which itself never exceeds
    /// [`MAX_DEPTH_LIMIT`].
    pub fn effective_limit(&self) -> i64 {
        let depth = self.depth_limit.clamp(1, MAX_DEPTH_LIMIT);
        self.per_type_limit
            .unwrap_or(DEFAULT_PER_TYPE_LIMIT)
            .clamp(1, depth)
    }
}

#[cfg(test)]
#[path = "settings.test.rs"]
mod tests;
