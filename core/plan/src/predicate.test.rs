use super::*;
use serde_json::json;

fn payment(status: &str) -> Value {
    json!({ "kind": "payment", "status": status, "amount": 150 })
}

#[test]
fn scalar_expectation_is_strict_equality() {
    assert!(matches_conditions(&json!({ "kind": "payment" }), &payment("A")));
    assert!(!matches_conditions(&json!({ "kind": "refund" }), &payment("A")));
    // Numbers compare strictly too.
    assert!(matches_conditions(&json!({ "amount": 150 }), &payment("A")));
    assert!(!matches_conditions(&json!({ "amount": 151 }), &payment("A")));
}

#[test]
fn array_expectation_is_membership() {
    let conditions = json!({ "status": ["A", "B"] });
    assert!(matches_conditions(&conditions, &payment("A")));
    assert!(!matches_conditions(&conditions, &payment("C")));
}

#[test]
fn missing_field_fails_equality() {
    assert!(!matches_conditions(&json!({ "nope": 1 }), &payment("A")));
}

#[test]
fn op_in_and_nin() {
    assert!(matches_conditions(
        &json!({ "status": { "$in": ["A", "B"] } }),
        &payment("A")
    ));
    assert!(!matches_conditions(
        &json!({ "status": { "$in": ["B"] } }),
        &payment("A")
    ));
    assert!(matches_conditions(
        &json!({ "status": { "$nin": ["B"] } }),
        &payment("A")
    ));
    assert!(!matches_conditions(
        &json!({ "status": { "$nin": ["A"] } }),
        &payment("A")
    ));
    // $nin accepts a missing field.
    assert!(matches_conditions(
        &json!({ "nope": { "$nin": ["A"] } }),
        &payment("A")
    ));
}

#[test]
fn op_ne() {
    assert!(matches_conditions(&json!({ "status": { "$ne": "B" } }), &payment("A")));
    assert!(!matches_conditions(&json!({ "status": { "$ne": "A" } }), &payment("A")));
    // A missing field is not equal to anything.
    assert!(matches_conditions(&json!({ "nope": { "$ne": "A" } }), &payment("A")));
}

#[test]
fn op_not_negates_recursively() {
    assert!(matches_conditions(
        &json!({ "status": { "$not": { "$in": ["B", "C"] } } }),
        &payment("A")
    ));
    assert!(!matches_conditions(
        &json!({ "status": { "$not": { "$in": ["A"] } } }),
        &payment("A")
    ));
}

#[test]
fn op_regex() {
    assert!(matches_conditions(
        &json!({ "status": { "$regex": "^A" } }),
        &payment("ABC")
    ));
    assert!(!matches_conditions(
        &json!({ "status": { "$regex": "^B" } }),
        &payment("ABC")
    ));
    // Non-string actual never matches.
    assert!(!matches_conditions(
        &json!({ "amount": { "$regex": "1" } }),
        &payment("A")
    ));
    // Non-string pattern is malformed.
    assert!(!matches_conditions(
        &json!({ "status": { "$regex": 5 } }),
        &payment("A")
    ));
}

#[test]
fn op_exists() {
    assert!(matches_conditions(&json!({ "status": { "$exists": true } }), &payment("A")));
    assert!(!matches_conditions(&json!({ "status": { "$exists": false } }), &payment("A")));
    assert!(matches_conditions(&json!({ "nope": { "$exists": false } }), &payment("A")));
    // Null counts as absent.
    let data = json!({ "status": null });
    assert!(matches_conditions(&json!({ "status": { "$exists": false } }), &data));
}

#[test]
fn op_or_mixes_literals_and_sub_predicates() {
    // "A" and "BX" match, "C" does not.
    let conditions = json!({ "status": { "$or": ["A", { "$regex": "^B" }] } });
    assert!(matches_conditions(&conditions, &payment("A")));
    assert!(matches_conditions(&conditions, &payment("BX")));
    assert!(!matches_conditions(&conditions, &payment("C")));
}

#[test]
fn unknown_operator_fails_the_predicate() {
    assert!(!matches_conditions(
        &json!({ "status": { "$between": [1, 2] } }),
        &payment("A")
    ));
}

#[test]
fn multiple_operators_all_must_hold() {
    let conditions = json!({ "status": { "$exists": true, "$ne": "B" } });
    assert!(matches_conditions(&conditions, &payment("A")));
    assert!(!matches_conditions(&conditions, &payment("B")));
}

#[test]
fn multiple_fields_all_must_hold() {
    let conditions = json!({ "kind": "payment", "status": "A" });
    assert!(matches_conditions(&conditions, &payment("A")));
    assert!(!matches_conditions(&conditions, &payment("B")));
}

#[test]
fn non_object_predicate_never_matches() {
    assert!(!matches_conditions(&json!("bad"), &payment("A")));
    assert!(!matches_conditions(&json!(["a"]), &payment("A")));
}
