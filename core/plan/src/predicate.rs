//! Selection predicate evaluation (`computationConditions`).

use serde_json::Value;

/// Evaluate a selection predicate against a fact payload.
///
/// The predicate is a mapping from field name to an expectation: a scalar
/// (strict equality), an array (membership), or a sub-predicate object whose
/// keys are operators. A fact matches when every entry matches. A predicate
/// that is not an object never matches.
pub fn matches_conditions(conditions: &Value, data: &Value) -> bool {
    let Some(entries) = conditions.as_object() else {
        tracing::warn!("Selection predicate is not an object");
        return false;
    };
    entries.iter().all(|(field, expected)| {
        let actual = data.as_object().and_then(|map| map.get(field));
        matches_expected(expected, actual)
    })
}

fn matches_expected(expected: &Value, actual: Option<&Value>) -> bool {
    match expected {
        Value::Object(operators) => operators
            .iter()
            .all(|(op, operand)| apply_operator(op, operand, actual)),
        Value::Array(choices) => actual.is_some_and(|value| choices.contains(value)),
        scalar => actual == Some(scalar),
    }
}

fn apply_operator(op: &str, operand: &Value, actual: Option<&Value>) -> bool {
    match op {
        "$in" => match operand.as_array() {
            Some(choices) => actual.is_some_and(|value| choices.contains(value)),
            None => malformed(op, "operand must be an array"),
        },
        "$nin" => match operand.as_array() {
            Some(choices) => !actual.is_some_and(|value| choices.contains(value)),
            None => malformed(op, "operand must be an array"),
        },
        "$ne" => actual != Some(operand),
        "$not" => !matches_expected(operand, actual),
        "$regex" => match (operand.as_str(), actual.and_then(Value::as_str)) {
            (Some(pattern), Some(text)) => match regex::Regex::new(pattern) {
                Ok(re) => re.is_match(text),
                Err(e) => {
                    tracing::warn!("Invalid $regex pattern '{pattern}': {e}");
                    false
                }
            },
            (None, _) => malformed(op, "operand must be a string"),
            (Some(_), None) => false,
        },
        "$exists" => match operand.as_bool() {
            Some(want) => is_present(actual) == want,
            None => malformed(op, "operand must be a boolean"),
        },
        "$or" => match operand.as_array() {
            Some(choices) => choices
                .iter()
                .any(|choice| matches_expected(choice, actual)),
            None => malformed(op, "operand must be an array"),
        },
        unknown => {
            tracing::warn!(operator = unknown, "Unknown predicate operator");
            false
        }
    }
}

fn is_present(actual: Option<&Value>) -> bool {
    actual.is_some_and(|value| !value.is_null())
}

fn malformed(op: &str, reason: &str) -> bool {
    tracing::warn!(operator = op, "Malformed predicate: {reason}");
    false
}

#[cfg(test)]
#[path = "predicate.test.rs"]
mod tests;
