//! Per-fact parameter substitution (`$$name` / `$$NOW`).

use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use tally_model::Fact;
use tally_protocol::format_wire_date;

/// Replace `$$` parameter references in a pipeline fragment.
///
/// `$$NOW` expands to `now` (rendered as a wire date so the worker-side
/// bridge rematerializes it as a real timestamp); `$$name` expands to
/// `fact.data.name`. An unresolvable reference is logged and left untouched.
/// The walk is purely functional and recurses through objects and arrays;
/// no other strings change.
pub fn substitute_params(value: &Value, fact: &Fact, now: DateTime<Utc>) -> Value {
    match value {
        Value::String(text) => match text.strip_prefix("$$") {
            Some("NOW") => Value::String(format_wire_date(now)),
            Some(name) => match fact.data_value(name) {
                Some(resolved) => resolved.clone(),
                None => {
                    tracing::warn!(
                        parameter = text.as_str(),
                        fact = fact.id.as_str(),
                        "Unresolved pipeline parameter"
                    );
                    value.clone()
                }
            },
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_params(item, fact, now))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute_params(item, fact, now)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "substitute.test.rs"]
mod tests;
