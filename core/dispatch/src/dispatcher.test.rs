use super::*;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tally_pool::PoolSettings;
use tally_pool::WorkerExit;
use tally_pool::WorkerLink;
use tally_pool::WorkerSpawner;
use tally_protocol::Message;
use tally_protocol::QueryMetrics;
use tally_protocol::QueryResult;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Minimal in-process worker: acks INIT and echoes every query, except ids
/// matching `ignore`, which are never answered.
struct EchoSpawner {
    ignore: Option<String>,
    fail_init: bool,
}

impl EchoSpawner {
    fn new() -> Self {
        Self {
            ignore: None,
            fail_init: false,
        }
    }

    fn ignoring(pattern: &str) -> Self {
        Self {
            ignore: Some(pattern.to_string()),
            fail_init: false,
        }
    }

    fn broken() -> Self {
        Self {
            ignore: None,
            fail_init: true,
        }
    }
}

#[async_trait]
impl WorkerSpawner for EchoSpawner {
    async fn spawn(&self, index: usize) -> tally_pool::Result<WorkerLink> {
        let (to_worker_tx, mut to_worker_rx) = mpsc::channel::<Message>(64);
        let (from_worker_tx, from_worker_rx) = mpsc::channel::<Message>(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let kill = CancellationToken::new();
        let ignore = self.ignore.clone();
        let fail_init = self.fail_init;

        tokio::spawn(async move {
            while let Some(message) = to_worker_rx.recv().await {
                match message {
                    Message::Init { .. } => {
                        if fail_init {
                            let _ = from_worker_tx
                                .send(Message::Error {
                                    message: "no database".to_string(),
                                })
                                .await;
                            let _ = exit_tx.send(WorkerExit {
                                code: Some(1),
                                message: "exit status: 1".to_string(),
                            });
                            return;
                        }
                        let _ = from_worker_tx.send(Message::Ready).await;
                    }
                    Message::QueryBatch { batch_id, requests } => {
                        let results = requests
                            .iter()
                            .filter(|request| {
                                !ignore
                                    .as_ref()
                                    .is_some_and(|pattern| request.id.contains(pattern.as_str()))
                            })
                            .map(|request| QueryResult {
                                id: request.id.clone(),
                                result: Some(vec![
                                    json!({ "echo": request.id, "worker": index }),
                                ]),
                                error: None,
                                metrics: QueryMetrics {
                                    query_time: 2.0,
                                    query_size: Some(10),
                                    result_size: Some(20),
                                },
                            })
                            .collect();
                        let _ = from_worker_tx
                            .send(Message::ResultBatch { batch_id, results })
                            .await;
                    }
                    Message::Shutdown => {
                        let _ = exit_tx.send(WorkerExit {
                            code: Some(0),
                            message: "exit status: 0".to_string(),
                        });
                        return;
                    }
                    _ => {}
                }
            }
        });

        Ok(WorkerLink {
            sender: to_worker_tx,
            receiver: from_worker_rx,
            exit: exit_rx,
            kill,
        })
    }
}

async fn dispatcher_with(spawner: EchoSpawner) -> Dispatcher {
    let settings = PoolSettings::new("mongodb://localhost:27017", "facts")
        .with_worker_init_timeout_ms(1_000);
    let pool = ProcessPool::start(spawner, settings).await;
    Dispatcher::new(Arc::new(pool))
}

fn request(id: &str) -> DispatchRequest {
    DispatchRequest::new("facts", json!([{ "$match": {} }])).with_id(id)
}

#[tokio::test]
async fn preserves_input_order_across_chunks() {
    let dispatcher = dispatcher_with(EchoSpawner::new()).await;
    let requests: Vec<DispatchRequest> = (0..7).map(|i| request(&format!("q-{i}"))).collect();

    let report = dispatcher
        .execute_queries(requests, ExecuteOptions::default().with_max_concurrency(2))
        .await
        .unwrap();

    assert_eq!(report.results.len(), 7);
    for (i, outcome) in report.results.iter().enumerate() {
        assert_eq!(outcome.id, format!("q-{i}"));
        assert!(outcome.result.is_some() != outcome.error.is_some());
    }
    assert_eq!(report.summary.total, 7);
    assert_eq!(report.summary.successful, 7);
    dispatcher.pool().shutdown().await;
}

#[tokio::test]
async fn assigns_ids_when_absent() {
    let dispatcher = dispatcher_with(EchoSpawner::new()).await;
    let report = dispatcher
        .execute_queries(
            vec![DispatchRequest::new("facts", json!([{ "$match": {} }]))],
            ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert!(!report.results[0].id.is_empty());
    dispatcher.pool().shutdown().await;
}

#[tokio::test]
async fn rejects_invalid_requests_up_front() {
    let dispatcher = dispatcher_with(EchoSpawner::new()).await;

    let err = dispatcher
        .execute_queries(
            vec![request("ok"), DispatchRequest::new("", json!([]))],
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    match err {
        DispatchError::InvalidRequest { index, reason } => {
            assert_eq!(index, 1);
            assert!(reason.contains("collectionName"));
        }
        other => panic!("unexpected: {other:?}"),
    }

    let err = dispatcher
        .execute_queries(
            vec![DispatchRequest::new("facts", json!({ "$match": {} }))],
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    match err {
        DispatchError::InvalidRequest { index, reason } => {
            assert_eq!(index, 0);
            assert!(reason.contains("array"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    dispatcher.pool().shutdown().await;
}

#[tokio::test]
async fn empty_input_yields_an_empty_report() {
    let dispatcher = dispatcher_with(EchoSpawner::new()).await;
    let report = dispatcher
        .execute_queries(Vec::new(), ExecuteOptions::default())
        .await
        .unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.summary.total, 0);
    dispatcher.pool().shutdown().await;
}

#[tokio::test]
async fn timeouts_resolve_as_error_results_not_rejections() {
    let dispatcher = dispatcher_with(EchoSpawner::ignoring("slow")).await;
    let requests = vec![
        request("q-0"),
        request("slow-1"),
        request("q-2"),
        request("q-3"),
    ];

    let report = dispatcher
        .execute_queries(
            requests,
            ExecuteOptions::default()
                .with_timeout_ms(300)
                .with_max_concurrency(1),
        )
        .await
        .unwrap();

    assert_eq!(report.summary.successful, 3);
    assert_eq!(report.summary.failed, 1);
    let slow = &report.results[1];
    assert!(slow.result.is_none());
    assert!(slow.error.as_ref().unwrap().message.contains("timeout"));

    let stats = dispatcher.stats().await;
    assert_eq!(stats.total_queries, 4);
    assert_eq!(stats.failed, 1);
    assert!(stats.last_error.as_ref().unwrap().contains("timeout"));
    dispatcher.pool().shutdown().await;
}

#[tokio::test]
async fn zero_ready_workers_is_an_immediate_error() {
    let dispatcher = dispatcher_with(EchoSpawner::broken()).await;
    let err = dispatcher
        .execute_queries(vec![request("q-0")], ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Pool(_)));
}

#[tokio::test]
async fn rolling_totals_accumulate_and_reset() {
    let dispatcher = dispatcher_with(EchoSpawner::new()).await;
    for _ in 0..3 {
        dispatcher
            .execute_queries(vec![request("q")], ExecuteOptions::default())
            .await
            .unwrap();
    }

    let stats = dispatcher.stats().await;
    assert_eq!(stats.total_queries, 3);
    assert_eq!(stats.successful, 3);
    assert_eq!(stats.total_query_size, 30);
    assert_eq!(stats.total_result_size, 60);
    assert!(stats.total_query_time >= 6.0);

    dispatcher.reset_stats().await;
    assert_eq!(dispatcher.stats().await.total_queries, 0);
    dispatcher.pool().shutdown().await;
}
