//! Counter definition records.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::error::Result;

/// One configured aggregation recipe.
///
/// `computation_conditions` selects the facts the counter applies to;
/// `evaluation_conditions` (optional) is inserted as a `$match` stage ahead
/// of the group stage built from `attributes`. `variables` only documents
/// the `$$name` parameters the pipeline expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDefinition {
    /// Counter name, unique within its index-type namespace.
    pub name: String,
    /// Index type this counter is computed under.
    pub index_type_name: String,
    /// Selection predicate over fact fields.
    pub computation_conditions: Value,
    /// Optional extra filter stage for the counter pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_conditions: Option<Value>,
    /// Aggregation group specification (the grouping key is forced to null
    /// at plan time).
    pub attributes: Value,
    /// Declared `$$` parameters, for documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
}

impl CounterDefinition {
    /// Validate one definition. `index` is its position in the loaded array,
    /// used for error reporting.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid(index, "name must be a non-empty string"));
        }
        if self.index_type_name.trim().is_empty() {
            return Err(invalid(index, "indexTypeName must be a non-empty string"));
        }
        if !self.computation_conditions.is_object() {
            return Err(invalid(index, "computationConditions must be an object"));
        }
        if let Some(conditions) = &self.evaluation_conditions {
            if !conditions.is_object() {
                return Err(invalid(index, "evaluationConditions must be an object"));
            }
        }
        if !self.attributes.is_object() {
            return Err(invalid(index, "attributes must be an object"));
        }
        Ok(())
    }
}

fn invalid(index: usize, reason: &str) -> ConfigError {
    ConfigError::InvalidCounter {
        index,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[path = "types.test.rs"]
mod tests;
