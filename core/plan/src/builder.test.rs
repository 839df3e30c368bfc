use super::*;
use chrono::TimeZone;
use pretty_assertions::assert_eq;
use serde_json::json;

fn fact_with(data: Value) -> Fact {
    Fact {
        id: "fact-1".to_string(),
        fact_type: 1,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        data,
    }
}

fn counter(name: &str, index_type: &str, conditions: Value) -> CounterDefinition {
    CounterDefinition {
        name: name.to_string(),
        index_type_name: index_type.to_string(),
        computation_conditions: conditions,
        evaluation_conditions: None,
        attributes: json!({ "count": { "$sum": 1 } }),
        variables: None,
    }
}

#[test]
fn groups_matching_counters_by_index_type() {
    let set = CounterSet::from_definitions(vec![
        counter("total", "T1", json!({ "kind": "payment" })),
        counter("sum", "T1", json!({ "kind": "payment" })),
        counter("other", "T2", json!({ "kind": "payment" })),
        counter("skipped", "T2", json!({ "kind": "refund" })),
    ])
    .unwrap();
    let fact = fact_with(json!({ "kind": "payment" }));

    let plan = build_plan(&set, &fact);
    assert_eq!(plan.len(), 2);
    assert_eq!(plan["T1"].len(), 2);
    assert_eq!(plan["T2"].len(), 1);
    assert!(plan["T2"].contains_key("other"));
    assert!(!plan["T2"].contains_key("skipped"));
}

#[test]
fn pipeline_is_group_only_without_evaluation_conditions() {
    let set = CounterSet::from_definitions(vec![counter("total", "T1", json!({}))]).unwrap();
    let fact = fact_with(json!({}));

    let plan = build_plan(&set, &fact);
    let stages = &plan["T1"]["total"];
    assert_eq!(stages.len(), 1);
    assert_eq!(
        stages[0],
        json!({ "$group": { "_id": null, "count": { "$sum": 1 } } })
    );
}

#[test]
fn evaluation_conditions_prepend_a_match_stage() {
    let mut with_match = counter("recent", "T1", json!({}));
    with_match.evaluation_conditions = Some(json!({ "status": "done" }));
    let set = CounterSet::from_definitions(vec![with_match]).unwrap();
    let fact = fact_with(json!({}));

    let plan = build_plan(&set, &fact);
    let stages = &plan["T1"]["recent"];
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0], json!({ "$match": { "status": "done" } }));
    assert!(stages[1].get("$group").is_some());
}

#[test]
fn grouping_key_is_forced_to_null() {
    let mut sneaky = counter("total", "T1", json!({}));
    sneaky.attributes = json!({ "_id": "$userId", "count": { "$sum": 1 } });
    let set = CounterSet::from_definitions(vec![sneaky]).unwrap();
    let fact = fact_with(json!({}));

    let plan = build_plan(&set, &fact);
    let group = &plan["T1"]["total"][0]["$group"];
    assert_eq!(group["_id"], Value::Null);
    assert_eq!(group["count"], json!({ "$sum": 1 }));
}

#[test]
fn parameters_are_substituted_in_both_stages() {
    let mut with_params = counter("byUser", "T1", json!({}));
    with_params.evaluation_conditions = Some(json!({ "userId": "$$userId" }));
    with_params.attributes = json!({ "latest": { "$max": "$$userId" } });
    let set = CounterSet::from_definitions(vec![with_params]).unwrap();
    let fact = fact_with(json!({ "userId": "u42" }));

    let plan = build_plan(&set, &fact);
    let stages = &plan["T1"]["byUser"];
    assert_eq!(stages[0], json!({ "$match": { "userId": "u42" } }));
    assert_eq!(stages[1]["$group"]["latest"], json!({ "$max": "u42" }));
}

#[test]
fn now_is_observed_once_per_plan() {
    let mut first = counter("a", "T1", json!({}));
    first.evaluation_conditions = Some(json!({ "since": "$$NOW" }));
    let mut second = counter("b", "T2", json!({}));
    second.evaluation_conditions = Some(json!({ "since": "$$NOW" }));
    let set = CounterSet::from_definitions(vec![first, second]).unwrap();
    let fact = fact_with(json!({}));

    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
    let plan = build_plan_at(&set, &fact, now);
    let a = plan["T1"]["a"][0]["$match"]["since"].as_str().unwrap();
    let b = plan["T2"]["b"][0]["$match"]["since"].as_str().unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "2024-05-01T10:30:00.000Z");
}

#[test]
fn applicable_counters_respects_predicates() {
    let set = CounterSet::from_definitions(vec![
        counter("a", "T1", json!({ "kind": "payment" })),
        counter("b", "T1", json!({ "kind": { "$in": ["refund", "payment"] } })),
        counter("c", "T1", json!({ "kind": "refund" })),
    ])
    .unwrap();
    let fact = fact_with(json!({ "kind": "payment" }));

    let applicable = applicable_counters(&set, &fact);
    let names: Vec<&str> = applicable.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn empty_plan_for_unmatched_fact() {
    let set = CounterSet::from_definitions(vec![counter("a", "T1", json!({ "kind": "x" }))])
        .unwrap();
    let fact = fact_with(json!({ "kind": "y" }));
    assert!(build_plan(&set, &fact).is_empty());
}
