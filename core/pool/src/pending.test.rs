use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tally_protocol::QueryMetrics;

fn wire_result(id: &str) -> QueryResult {
    QueryResult {
        id: id.to_string(),
        result: Some(vec![json!({ "count": 1 })]),
        error: None,
        metrics: QueryMetrics::default(),
    }
}

#[tokio::test]
async fn register_then_complete_delivers_once() {
    let table = PendingTable::new();
    let receiver = table.register("q-1".to_string(), 0).await;
    assert_eq!(table.len().await, 1);

    assert!(table.complete(wire_result("q-1")).await);
    assert_eq!(table.len().await, 0);

    let outcome = receiver.await.unwrap();
    assert_eq!(outcome.id, "q-1");
    assert!(outcome.is_success());
}

#[tokio::test]
async fn late_results_for_unknown_ids_are_dropped() {
    let table = PendingTable::new();
    assert!(!table.complete(wire_result("never-registered")).await);

    let receiver = table.register("q-1".to_string(), 0).await;
    assert!(table.complete(wire_result("q-1")).await);
    // A second completion for the same id finds nothing.
    assert!(!table.complete(wire_result("q-1")).await);
    drop(receiver);
}

#[tokio::test]
async fn remove_prevents_delivery() {
    let table = PendingTable::new();
    let receiver = table.register("q-1".to_string(), 0).await;
    assert!(table.remove("q-1").await);
    assert!(!table.remove("q-1").await);
    assert!(!table.complete(wire_result("q-1")).await);
    // The sender is gone; the receiver resolves with an error.
    assert!(receiver.await.is_err());
}

#[tokio::test]
async fn fail_worker_only_touches_that_workers_entries() {
    let table = PendingTable::new();
    let on_zero = table.register("q-0".to_string(), 0).await;
    let on_one = table.register("q-1".to_string(), 1).await;

    let failed = table
        .fail_worker(0, |id| WireError::new("WorkerExitError", format!("{id} aborted")))
        .await;
    assert_eq!(failed, 1);
    assert_eq!(table.len().await, 1);

    let outcome = on_zero.await.unwrap();
    assert_eq!(outcome.error.unwrap().name, "WorkerExitError");

    assert!(table.complete(wire_result("q-1")).await);
    assert!(on_one.await.unwrap().is_success());
}

#[tokio::test]
async fn fail_all_drains_everything() {
    let table = PendingTable::new();
    let receivers: Vec<_> = (0..4)
        .map(|i| (i, format!("q-{i}")))
        .collect::<Vec<_>>();
    let mut waits = Vec::new();
    for (worker, id) in receivers {
        waits.push(table.register(id, worker).await);
    }

    let failed = table
        .fail_all(|id| WireError::new("ShutdownError", format!("{id}: shutting down")))
        .await;
    assert_eq!(failed, 4);
    assert_eq!(table.len().await, 0);

    for wait in waits {
        let outcome = wait.await.unwrap();
        assert_eq!(outcome.error.unwrap().name, "ShutdownError");
    }
}
