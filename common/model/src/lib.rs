//! Core data model: facts, index entries, and index descriptors.
//!
//! A *fact* is the durable record derived from one ingested event. An *index
//! entry* links a fact to an equivalence class through a hashed field value,
//! and an *index descriptor* is the per-fact, per-index-type handle the
//! indexer hands to the counter coordinator.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A durable record derived from an input event.
///
/// Facts are created by upsert on ingestion and never mutated in place or
/// deleted on the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Opaque unique key derived from the event.
    #[serde(rename = "_id")]
    pub id: String,
    /// Event type code (positive integer).
    #[serde(rename = "type")]
    pub fact_type: i32,
    /// Creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Arbitrary nested payload carried over from the event.
    #[serde(default)]
    pub data: Value,
}

impl Fact {
    /// Look up a top-level field of the fact payload.
    ///
    /// Returns `None` when the payload is not an object or the field is
    /// absent.
    pub fn data_value(&self, name: &str) -> Option<&Value> {
        self.data.as_object().and_then(|map| map.get(name))
    }
}

/// A join-table row linking a fact to an equivalence class.
///
/// Identity is the compound `(hash, fact_id)`; at most one entry exists per
/// `(index type, field value, fact)` tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Hash combining the index-type code and a field value of the fact.
    #[serde(rename = "h")]
    pub hash: String,
    /// Identity of the fact this entry points at.
    #[serde(rename = "f")]
    pub fact_id: String,
    /// Date copied from a named fact field, falling back to the fact's
    /// `createdAt` when the field is absent or unparsable. Monotonic only
    /// within the fact, not globally.
    pub dt: DateTime<Utc>,
    /// Creation timestamp of the entry itself.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Embedded copy of the fact payload, present only when the
    /// include-fact-data-in-index policy is enabled (lets aggregations run
    /// entirely on the index collection).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Resolve the `dt` value for an index entry of `fact`.
///
/// Reads `fact.data[date_field]` as an ISO-8601 string; the fact's
/// `createdAt` is the fallback for a missing or unparsable value.
pub fn resolve_entry_dt(fact: &Fact, date_field: &str) -> DateTime<Utc> {
    fact.data_value(date_field)
        .and_then(Value::as_str)
        .and_then(parse_lenient_date)
        .unwrap_or(fact.created_at)
}

fn parse_lenient_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Dates on the wire may omit the trailing zone designator.
    text.parse::<chrono::NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc())
}

/// Per-fact, per-index-type lookup handle produced by the indexer.
///
/// Carries both the numeric type code (baked into the hash) and the
/// configured type name (the key counters are grouped under), so consumers
/// never need a side table to translate between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Numeric index-type code.
    #[serde(rename = "typeCode")]
    pub type_code: i32,
    /// Configured index-type name.
    #[serde(rename = "typeName")]
    pub type_name: String,
    /// Pre-computed hash of `(type_code, field value)` for this fact.
    #[serde(rename = "hashValue")]
    pub hash_value: String,
}

#[cfg(test)]
#[path = "lib.test.rs"]
mod tests;
