use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn init_uses_wire_discriminator_and_field_names() {
    let message = Message::Init {
        connection_string: "mongodb://localhost:27017".to_string(),
        database_name: "facts".to_string(),
        database_options: json!({ "appName": "tally" }),
    };
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["type"], "INIT");
    assert_eq!(value["connectionString"], "mongodb://localhost:27017");
    assert_eq!(value["databaseName"], "facts");
    assert_eq!(value["databaseOptions"]["appName"], "tally");
}

#[test]
fn query_batch_roundtrip() {
    let message = Message::QueryBatch {
        batch_id: "b-1".to_string(),
        requests: vec![QueryRequest {
            id: "q-1".to_string(),
            collection_name: "facts".to_string(),
            query: vec![json!({ "$match": { "type": 3 } })],
            options: json!({}),
        }],
    };
    let line = serde_json::to_string(&message).unwrap();
    assert!(line.contains("\"QUERY_BATCH\""));
    assert!(line.contains("\"batchId\""));
    assert!(line.contains("\"collectionName\""));

    let back: Message = serde_json::from_str(&line).unwrap();
    match back {
        Message::QueryBatch { batch_id, requests } => {
            assert_eq!(batch_id, "b-1");
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].id, "q-1");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn result_omits_absent_error() {
    let message = Message::Result(QueryResult {
        id: "q-1".to_string(),
        result: Some(vec![json!({ "count": 3 })]),
        error: None,
        metrics: QueryMetrics {
            query_time: 12.5,
            query_size: None,
            result_size: Some(64),
        },
    });
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["type"], "RESULT");
    assert!(value.get("error").is_none());
    assert_eq!(value["metrics"]["queryTime"], 12.5);
    assert_eq!(value["metrics"]["resultSize"], 64);
    assert!(value["metrics"].get("querySize").is_none());
}

#[test]
fn unknown_fields_are_tolerated() {
    let line = r#"{"type":"READY","extra":"ignored"}"#;
    let message: Message = serde_json::from_str(line).unwrap();
    assert!(matches!(message, Message::Ready));

    let line = r#"{"type":"RESULT","id":"q","result":null,"metrics":{"queryTime":1.0,"futureField":true}}"#;
    let message: Message = serde_json::from_str(line).unwrap();
    match message {
        Message::Result(result) => {
            assert_eq!(result.id, "q");
            assert!(result.result.is_none());
            assert!(result.error.is_none());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn error_and_shutdown_variants() {
    let value = serde_json::to_value(Message::Error {
        message: "no route to host".to_string(),
    })
    .unwrap();
    assert_eq!(value["type"], "ERROR");

    let value = serde_json::to_value(Message::Shutdown).unwrap();
    assert_eq!(value, json!({ "type": "SHUTDOWN" }));
}
