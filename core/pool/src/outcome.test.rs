use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn successful_wire_results_become_documents() {
    let outcome = QueryOutcome::from_wire(QueryResult {
        id: "q-1".to_string(),
        result: Some(vec![
            json!({ "count": 3, "latest": "2024-05-01T12:00:00.000Z" }),
        ]),
        error: None,
        metrics: QueryMetrics {
            query_time: 4.2,
            ..QueryMetrics::default()
        },
    });

    assert!(outcome.is_success());
    let documents = outcome.result.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get_i32("count").unwrap(), 3);
    // The date-shaped string was rematerialized as a timestamp.
    assert!(matches!(documents[0].get("latest"), Some(Bson::DateTime(_))));
    assert_eq!(outcome.metrics.query_time, 4.2);
}

#[test]
fn wire_errors_pass_through() {
    let outcome = QueryOutcome::from_wire(QueryResult {
        id: "q-1".to_string(),
        result: None,
        error: Some(WireError::new("MongoError", "cursor lost")),
        metrics: QueryMetrics::default(),
    });
    assert!(!outcome.is_success());
    assert!(outcome.result.is_none());
    assert_eq!(outcome.error.unwrap().name, "MongoError");
}

#[test]
fn neither_result_nor_error_is_normalized_to_an_error() {
    let outcome = QueryOutcome::from_wire(QueryResult {
        id: "q-1".to_string(),
        result: None,
        error: None,
        metrics: QueryMetrics::default(),
    });
    assert!(outcome.error.is_some());
    assert!(outcome.result.is_none());
}

#[test]
fn non_document_elements_are_dropped() {
    let outcome = QueryOutcome::from_wire(QueryResult {
        id: "q-1".to_string(),
        result: Some(vec![json!({ "ok": 1 }), json!(42), json!("text")]),
        error: None,
        metrics: QueryMetrics::default(),
    });
    assert_eq!(outcome.result.unwrap().len(), 1);
}

#[test]
fn failure_constructor_carries_the_error() {
    let outcome = QueryOutcome::failure("q-9", WireError::new("TimeoutError", "too slow"));
    assert_eq!(outcome.id, "q-9");
    assert!(!outcome.is_success());
    assert!(outcome.result.is_none());
}
