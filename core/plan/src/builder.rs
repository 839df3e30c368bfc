//! Assembly of per-fact counter plans.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use tally_config::CounterDefinition;
use tally_config::CounterSet;
use tally_model::Fact;

use crate::predicate::matches_conditions;
use crate::substitute::substitute_params;

/// Pipelines of one index type, keyed by counter name.
pub type CounterPipelines = BTreeMap<String, Vec<Value>>;

/// The per-fact plan: index-type name → counter name → pipeline stages.
pub type CounterPlan = BTreeMap<String, CounterPipelines>;

/// The counter definitions whose selection predicate matches `fact`.
pub fn applicable_counters<'a>(set: &'a CounterSet, fact: &Fact) -> Vec<&'a CounterDefinition> {
    set.counters()
        .iter()
        .filter(|counter| matches_conditions(&counter.computation_conditions, &fact.data))
        .collect()
}

/// Build the counter plan for `fact`, observing the current time once.
pub fn build_plan(set: &CounterSet, fact: &Fact) -> CounterPlan {
    build_plan_at(set, fact, Utc::now())
}

/// Build the counter plan for `fact` with an explicit `$$NOW` expansion time.
///
/// Every `$$NOW` in the plan expands to this single instant.
pub fn build_plan_at(set: &CounterSet, fact: &Fact, now: DateTime<Utc>) -> CounterPlan {
    let mut plan = CounterPlan::new();
    for counter in applicable_counters(set, fact) {
        let mut stages = Vec::with_capacity(2);
        if let Some(conditions) = &counter.evaluation_conditions {
            stages.push(json!({ "$match": conditions }));
        }
        stages.push(json!({ "$group": group_spec(&counter.attributes) }));

        let stages = stages
            .iter()
            .map(|stage| substitute_params(stage, fact, now))
            .collect();

        plan.entry(counter.index_type_name.clone())
            .or_default()
            .insert(counter.name.clone(), stages);
    }
    tracing::debug!(
        fact = fact.id.as_str(),
        index_types = plan.len(),
        "Built counter plan"
    );
    plan
}

/// Group specification from counter attributes, with the grouping key forced
/// to null.
fn group_spec(attributes: &Value) -> Value {
    let mut spec = serde_json::Map::new();
    spec.insert("_id".to_string(), Value::Null);
    if let Some(attrs) = attributes.as_object() {
        for (key, item) in attrs {
            if key != "_id" {
                spec.insert(key.clone(), item.clone());
            }
        }
    }
    Value::Object(spec)
}

#[cfg(test)]
#[path = "builder.test.rs"]
mod tests;
