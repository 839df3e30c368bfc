use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::BufReader;

async fn drive(input: Vec<Message>) -> (Result<()>, Vec<Message>) {
    let mut script = Vec::new();
    for message in &input {
        tally_protocol::write_message(&mut script, message)
            .await
            .unwrap();
    }
    let mut replies = Vec::new();
    let outcome = run(BufReader::new(script.as_slice()), &mut replies).await;

    let mut reader = BufReader::new(replies.as_slice());
    let mut parsed = Vec::new();
    while let Some(message) = tally_protocol::read_message(&mut reader).await.unwrap() {
        parsed.push(message);
    }
    (outcome, parsed)
}

#[tokio::test]
async fn shutdown_ends_the_loop_cleanly() {
    let (outcome, replies) = drive(vec![Message::Shutdown]).await;
    assert!(outcome.is_ok());
    assert!(replies.is_empty());
}

#[tokio::test]
async fn end_of_stream_is_a_clean_exit() {
    let (outcome, replies) = drive(Vec::new()).await;
    assert!(outcome.is_ok());
    assert!(replies.is_empty());
}

#[tokio::test]
async fn queries_before_init_resolve_as_state_errors() {
    let request = QueryRequest {
        id: "q-1".to_string(),
        collection_name: "facts".to_string(),
        query: vec![json!({ "$match": {} })],
        options: json!({}),
    };
    let (outcome, replies) = drive(vec![Message::Query(request), Message::Shutdown]).await;
    assert!(outcome.is_ok());

    match &replies[0] {
        Message::Result(result) => {
            assert_eq!(result.id, "q-1");
            assert!(result.result.is_none());
            assert_eq!(result.error.as_ref().unwrap().name, "StateError");
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn batches_reply_in_request_order() {
    let requests: Vec<QueryRequest> = (0..3)
        .map(|i| QueryRequest {
            id: format!("q-{i}"),
            collection_name: "facts".to_string(),
            query: vec![json!({ "$match": {} })],
            options: json!({}),
        })
        .collect();
    let (outcome, replies) = drive(vec![
        Message::QueryBatch {
            batch_id: "b-1".to_string(),
            requests,
        },
        Message::Shutdown,
    ])
    .await;
    assert!(outcome.is_ok());

    match &replies[0] {
        Message::ResultBatch { batch_id, results } => {
            assert_eq!(batch_id, "b-1");
            let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["q-0", "q-1", "q-2"]);
            // Uninitialized worker: every element carries the same error shape.
            assert!(results.iter().all(|r| r.error.is_some()));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_lines_are_skipped() {
    let mut script = Vec::new();
    tally_protocol::write_message(&mut script, &Message::Shutdown)
        .await
        .unwrap();
    let mut input = b"this is not json\n".to_vec();
    input.extend_from_slice(&script);

    let mut replies = Vec::new();
    let outcome = run(BufReader::new(input.as_slice()), &mut replies).await;
    assert!(outcome.is_ok());
}

#[test]
fn worker_options_parse_recognized_keys() {
    let options = WorkerOptions::from_value(&json!({
        "appName": "tally",
        "connectTimeoutMS": 2_500,
        "debug": true,
        "futureKnob": "ignored",
    }));
    assert_eq!(options.app_name.as_deref(), Some("tally"));
    assert_eq!(options.connect_timeout_ms, 2_500);
    assert!(options.debug);

    let defaults = WorkerOptions::from_value(&json!({}));
    assert!(defaults.app_name.is_none());
    assert_eq!(defaults.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    assert!(!defaults.debug);
}
