use super::*;
use serde_json::json;

fn sample() -> CounterDefinition {
    CounterDefinition {
        name: "total".to_string(),
        index_type_name: "T1".to_string(),
        computation_conditions: json!({ "kind": "payment" }),
        evaluation_conditions: None,
        attributes: json!({ "count": { "$sum": 1 } }),
        variables: None,
    }
}

#[test]
fn valid_definition_passes() {
    assert!(sample().validate(0).is_ok());
}

#[test]
fn empty_name_is_rejected() {
    let mut counter = sample();
    counter.name = "  ".to_string();
    let err = counter.validate(2).unwrap_err();
    assert!(err.to_string().contains("index 2"));
    assert!(err.to_string().contains("name"));
}

#[test]
fn non_object_conditions_are_rejected() {
    let mut counter = sample();
    counter.computation_conditions = json!([1, 2]);
    assert!(counter.validate(0).is_err());

    let mut counter = sample();
    counter.evaluation_conditions = Some(json!("bad"));
    assert!(counter.validate(0).is_err());
}

#[test]
fn non_object_attributes_are_rejected() {
    let mut counter = sample();
    counter.attributes = json!(3);
    assert!(counter.validate(0).is_err());
}

#[test]
fn deserializes_from_camel_case() {
    let counter: CounterDefinition = serde_json::from_value(json!({
        "name": "sumAmount",
        "indexTypeName": "T1",
        "computationConditions": { "kind": "payment" },
        "evaluationConditions": { "status": "done" },
        "attributes": { "sum": { "$sum": "$d.amount" } },
        "variables": ["userId"],
    }))
    .unwrap();
    assert_eq!(counter.name, "sumAmount");
    assert_eq!(counter.index_type_name, "T1");
    assert!(counter.evaluation_conditions.is_some());
    assert_eq!(counter.variables.as_deref(), Some(&["userId".to_string()][..]));
}

#[test]
fn non_string_variables_fail_to_deserialize() {
    let result = serde_json::from_value::<CounterDefinition>(json!({
        "name": "x",
        "indexTypeName": "T1",
        "computationConditions": {},
        "attributes": {},
        "variables": ["ok", 42],
    }));
    assert!(result.is_err());
}
