use super::*;
use chrono::TimeZone;
use pretty_assertions::assert_eq;
use serde_json::json;
use tally_protocol::parse_wire_date;

fn fact() -> Fact {
    Fact {
        id: "fact-1".to_string(),
        fact_type: 1,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        data: json!({ "userId": "u42", "amount": 150, "tags": ["x", "y"] }),
    }
}

#[test]
fn replaces_named_parameters_everywhere() {
    let pipeline = json!({
        "$match": { "userId": "$$userId", "nested": { "also": "$$userId" } },
        "list": ["$$amount", "$$userId", "untouched"],
    });
    let expanded = substitute_params(&pipeline, &fact(), Utc::now());
    assert_eq!(
        expanded,
        json!({
            "$match": { "userId": "u42", "nested": { "also": "u42" } },
            "list": [150, "u42", "untouched"],
        })
    );
}

#[test]
fn user_id_match_stage_expands() {
    let stage = json!({ "$match": { "userId": "$$userId" } });
    let expanded = substitute_params(&stage, &fact(), Utc::now());
    assert_eq!(expanded, json!({ "$match": { "userId": "u42" } }));
}

#[test]
fn now_expands_to_a_current_timestamp() {
    let before = Utc::now();
    let expanded = substitute_params(&json!({ "floor": "$$NOW" }), &fact(), Utc::now());
    let after = Utc::now();

    let text = expanded["floor"].as_str().unwrap();
    let stamp = parse_wire_date(text).unwrap();
    assert!(stamp >= before - chrono::Duration::seconds(1));
    assert!(stamp <= after + chrono::Duration::seconds(1));
}

#[test]
fn unresolved_parameters_are_kept_verbatim() {
    let stage = json!({ "$match": { "userId": "$$missing" } });
    let expanded = substitute_params(&stage, &fact(), Utc::now());
    assert_eq!(expanded, stage);
}

#[test]
fn parameter_values_may_be_structured() {
    let expanded = substitute_params(&json!("$$tags"), &fact(), Utc::now());
    assert_eq!(expanded, json!(["x", "y"]));
}

#[test]
fn other_strings_do_not_change() {
    let stage = json!({
        "field": "$d.amount",
        "dollar": "$once",
        "plain": "NOW",
        "num": 42,
        "flag": true,
    });
    let expanded = substitute_params(&stage, &fact(), Utc::now());
    assert_eq!(expanded, stage);
}

#[test]
fn inputs_are_not_mutated() {
    let stage = json!({ "userId": "$$userId" });
    let copy = stage.clone();
    let _ = substitute_params(&stage, &fact(), Utc::now());
    assert_eq!(stage, copy);
}
