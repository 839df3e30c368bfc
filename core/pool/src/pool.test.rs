use super::*;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use tally_protocol::QueryMetrics;
use tally_protocol::QueryResult;

/// Scripted behavior for fake workers.
#[derive(Debug, Clone, Default)]
struct FakeScript {
    /// Reply `ERROR` to `INIT` instead of `READY`.
    fail_init: bool,
    /// Never reply to `INIT` at all.
    silent_init: bool,
    /// Requests whose id contains this substring are never answered.
    ignore_matching: Option<String>,
    /// Exit with a failure before answering query number `n + 1` of an
    /// incarnation.
    crash_after: Option<usize>,
}

/// In-process stand-in for worker processes.
struct FakeSpawner {
    script: FakeScript,
    served: Arc<Mutex<HashMap<usize, usize>>>,
    spawn_count: Arc<AtomicUsize>,
}

impl FakeSpawner {
    fn new(script: FakeScript) -> Self {
        Self {
            script,
            served: Arc::new(Mutex::new(HashMap::new())),
            spawn_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn served_handle(&self) -> Arc<Mutex<HashMap<usize, usize>>> {
        Arc::clone(&self.served)
    }

    fn spawn_count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.spawn_count)
    }
}

#[async_trait]
impl WorkerSpawner for FakeSpawner {
    async fn spawn(&self, index: usize) -> Result<WorkerLink> {
        self.spawn_count.fetch_add(1, Ordering::AcqRel);
        let (to_worker_tx, to_worker_rx) = mpsc::channel(64);
        let (from_worker_tx, from_worker_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let kill = CancellationToken::new();

        tokio::spawn(fake_worker(
            index,
            self.script.clone(),
            Arc::clone(&self.served),
            to_worker_rx,
            from_worker_tx,
            exit_tx,
            kill.clone(),
        ));

        Ok(WorkerLink {
            sender: to_worker_tx,
            receiver: from_worker_rx,
            exit: exit_rx,
            kill,
        })
    }
}

async fn fake_worker(
    index: usize,
    script: FakeScript,
    served: Arc<Mutex<HashMap<usize, usize>>>,
    mut inbound: mpsc::Receiver<Message>,
    outbound: mpsc::Sender<Message>,
    exit: oneshot::Sender<WorkerExit>,
    kill: CancellationToken,
) {
    match inbound.recv().await {
        Some(Message::Init { .. }) => {
            if script.silent_init {
                while inbound.recv().await.is_some() {}
                return;
            }
            if script.fail_init {
                let _ = outbound
                    .send(Message::Error {
                        message: "cannot reach database".to_string(),
                    })
                    .await;
                let _ = exit.send(WorkerExit {
                    code: Some(1),
                    message: "exit status: 1".to_string(),
                });
                return;
            }
            let _ = outbound.send(Message::Ready).await;
        }
        _ => return,
    }

    let mut answered = 0usize;
    loop {
        tokio::select! {
            _ = kill.cancelled() => {
                let _ = exit.send(WorkerExit {
                    code: None,
                    message: "signal: 9 (SIGKILL)".to_string(),
                });
                return;
            }
            maybe = inbound.recv() => match maybe {
                Some(Message::Query(request)) => {
                    if let Some(pattern) = &script.ignore_matching {
                        if request.id.contains(pattern.as_str()) {
                            continue;
                        }
                    }
                    if script.crash_after.is_some_and(|limit| answered >= limit) {
                        let _ = exit.send(WorkerExit {
                            code: Some(1),
                            message: "exit status: 1".to_string(),
                        });
                        return;
                    }
                    answered += 1;
                    *served.lock().await.entry(index).or_insert(0) += 1;
                    let _ = outbound
                        .send(Message::Result(QueryResult {
                            id: request.id.clone(),
                            result: Some(vec![json!({ "echo": request.id, "worker": index })]),
                            error: None,
                            metrics: QueryMetrics {
                                query_time: 1.0,
                                ..QueryMetrics::default()
                            },
                        }))
                        .await;
                }
                Some(Message::QueryBatch { batch_id, requests }) => {
                    let mut results = Vec::new();
                    for request in requests {
                        if let Some(pattern) = &script.ignore_matching {
                            if request.id.contains(pattern.as_str()) {
                                continue;
                            }
                        }
                        if script.crash_after.is_some_and(|limit| answered >= limit) {
                            let _ = outbound
                                .send(Message::ResultBatch {
                                    batch_id,
                                    results,
                                })
                                .await;
                            let _ = exit.send(WorkerExit {
                                code: Some(1),
                                message: "exit status: 1".to_string(),
                            });
                            return;
                        }
                        answered += 1;
                        *served.lock().await.entry(index).or_insert(0) += 1;
                        results.push(QueryResult {
                            id: request.id.clone(),
                            result: Some(vec![json!({ "echo": request.id, "worker": index })]),
                            error: None,
                            metrics: QueryMetrics {
                                query_time: 1.0,
                                ..QueryMetrics::default()
                            },
                        });
                    }
                    let _ = outbound
                        .send(Message::ResultBatch { batch_id, results })
                        .await;
                }
                Some(Message::Shutdown) => {
                    let _ = exit.send(WorkerExit {
                        code: Some(0),
                        message: "exit status: 0".to_string(),
                    });
                    return;
                }
                Some(_) => {}
                None => {
                    let _ = exit.send(WorkerExit {
                        code: Some(1),
                        message: "channel closed".to_string(),
                    });
                    return;
                }
            }
        }
    }
}

fn settings() -> PoolSettings {
    PoolSettings::new("mongodb://localhost:27017", "facts").with_worker_init_timeout_ms(1_000)
}

fn request(id: &str) -> QueryRequest {
    QueryRequest {
        id: id.to_string(),
        collection_name: "facts".to_string(),
        query: vec![json!({ "$match": {} })],
        options: json!({}),
    }
}

#[tokio::test]
async fn all_requests_complete_with_result_xor_error() {
    let pool = ProcessPool::start(FakeSpawner::new(FakeScript::default()), settings()).await;
    let requests: Vec<QueryRequest> = (0..5).map(|i| request(&format!("q-{i}"))).collect();

    let worker = pool.next_ready_worker().await.unwrap();
    let outcomes = pool
        .execute_batch_on_worker(worker, requests.clone(), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), requests.len());
    for (request, outcome) in requests.iter().zip(&outcomes) {
        assert_eq!(outcome.id, request.id);
        assert!(outcome.result.is_some() != outcome.error.is_some());
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn round_robin_is_fair_across_serial_dispatches() {
    let spawner = FakeSpawner::new(FakeScript::default());
    let served = spawner.served_handle();
    let pool = ProcessPool::start(spawner, settings().with_worker_count(2)).await;

    for i in 0..6 {
        let worker = pool.next_ready_worker().await.unwrap();
        let outcome = pool
            .execute_on_worker(worker, request(&format!("q-{i}")), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    let counts = served.lock().await.clone();
    assert_eq!(counts.get(&0), Some(&3));
    assert_eq!(counts.get(&1), Some(&3));
    pool.shutdown().await;
}

#[tokio::test]
async fn timeout_is_localized_to_the_slow_request() {
    let pool = ProcessPool::start(
        FakeSpawner::new(FakeScript {
            ignore_matching: Some("slow".to_string()),
            ..FakeScript::default()
        }),
        settings(),
    )
    .await;

    let requests = vec![
        request("q-0"),
        request("q-1"),
        request("slow-2"),
        request("q-3"),
    ];
    let worker = pool.next_ready_worker().await.unwrap();
    let outcomes = pool
        .execute_batch_on_worker(worker, requests, Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 4);
    for outcome in [&outcomes[0], &outcomes[1], &outcomes[3]] {
        assert!(outcome.is_success());
        assert!(outcome.result.is_some());
    }
    let slow = &outcomes[2];
    assert!(slow.result.is_none());
    let error = slow.error.as_ref().unwrap();
    assert!(error.message.contains("timeout"));

    // The worker survived the timeout.
    assert_eq!(pool.ready_workers().await.len(), 2);
    let stats = pool.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 3);
    pool.shutdown().await;
}

#[tokio::test]
async fn crashed_workers_are_replaced_and_queries_mostly_succeed() {
    let spawner = FakeSpawner::new(FakeScript {
        crash_after: Some(3),
        ..FakeScript::default()
    });
    let spawn_count = spawner.spawn_count_handle();
    let pool = ProcessPool::start(spawner, settings().with_worker_count(2)).await;

    let mut succeeded = 0;
    for i in 0..10 {
        let mut picked = pool.next_ready_worker().await;
        while picked.is_err() {
            // Both workers mid-restart; wait for a replacement.
            tokio::time::sleep(Duration::from_millis(50)).await;
            picked = pool.next_ready_worker().await;
        }
        let worker = picked.unwrap();
        let outcome = pool
            .execute_on_worker(worker, request(&format!("q-{i}")), Duration::from_millis(500))
            .await
            .unwrap();
        if outcome.is_success() {
            succeeded += 1;
        }
        // Serialized dispatches, like the callers the pool is built for.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(succeeded >= 8, "only {succeeded} of 10 queries succeeded");

    // Replacements were spawned and the pool healed to two workers.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = pool.stats().await;
    assert!(stats.restarted_workers >= 1);
    assert_eq!(stats.active_workers, 2);
    assert!(spawn_count.load(Ordering::Acquire) > 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn dead_workers_pending_queries_fail_before_their_timeout() {
    let pool = ProcessPool::start(
        FakeSpawner::new(FakeScript {
            crash_after: Some(0),
            ..FakeScript::default()
        }),
        settings(),
    )
    .await;

    let worker = pool.next_ready_worker().await.unwrap();
    let started = tokio::time::Instant::now();
    let outcomes = pool
        .execute_batch_on_worker(worker, vec![request("q-0")], Duration::from_secs(30))
        .await
        .unwrap();

    // Resolved by the eager worker-exit cancellation, not the 30s timer.
    assert!(started.elapsed() < Duration::from_secs(5));
    let error = outcomes[0].error.as_ref().unwrap();
    assert!(error.message.contains("worker exited"));
    pool.shutdown().await;
}

#[tokio::test]
async fn shutdown_rejects_pending_work_and_empties_the_pool() {
    let pool = Arc::new(
        ProcessPool::start(
            FakeSpawner::new(FakeScript {
                ignore_matching: Some(String::new()),
                ..FakeScript::default()
            }),
            settings(),
        )
        .await,
    );

    let mut callers = Vec::new();
    for chunk in 0..5 {
        let pool = Arc::clone(&pool);
        callers.push(tokio::spawn(async move {
            let requests: Vec<QueryRequest> = (0..10)
                .map(|i| request(&format!("q-{chunk}-{i}")))
                .collect();
            let worker = pool.next_ready_worker().await?;
            pool.execute_batch_on_worker(worker, requests, Duration::from_secs(30))
                .await
        }));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let shutdown_started = tokio::time::Instant::now();
    pool.shutdown().await;
    assert!(shutdown_started.elapsed() < Duration::from_secs(6));

    for caller in callers {
        let outcomes = caller.await.unwrap().unwrap();
        assert_eq!(outcomes.len(), 10);
        for outcome in outcomes {
            let error = outcome.error.expect("all queries fail at shutdown");
            assert!(error.message.contains("shutting down"));
        }
    }

    assert!(pool.ready_workers().await.is_empty());
    assert_eq!(pool.pending_queries().await, 0);

    // Further work is refused.
    assert!(matches!(
        pool.next_ready_worker().await,
        Err(PoolError::ShuttingDown)
    ));

    // Idempotent.
    pool.shutdown().await;
}

#[tokio::test]
async fn degraded_start_surfaces_an_initialization_error() {
    let pool = ProcessPool::start(
        FakeSpawner::new(FakeScript {
            fail_init: true,
            ..FakeScript::default()
        }),
        settings(),
    )
    .await;

    assert!(pool.ready_workers().await.is_empty());
    match pool.next_ready_worker().await {
        Err(PoolError::NotInitialized { cause }) => {
            assert!(cause.contains("cannot reach database"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    match pool
        .execute_batch_on_worker(0, vec![request("q-0")], Duration::from_secs(1))
        .await
    {
        Err(PoolError::NotInitialized { .. }) => {}
        other => panic!("unexpected: {other:?}"),
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn workers_that_never_report_ready_are_killed() {
    let spawner = FakeSpawner::new(FakeScript {
        silent_init: true,
        ..FakeScript::default()
    });
    let pool = ProcessPool::start(
        spawner,
        settings().with_worker_init_timeout_ms(100),
    )
    .await;

    assert!(pool.ready_workers().await.is_empty());
    assert!(matches!(
        pool.next_ready_worker().await,
        Err(PoolError::NotInitialized { .. })
    ));
    pool.shutdown().await;
}

#[tokio::test]
async fn stats_track_dispatch_and_per_worker_counters() {
    let pool = ProcessPool::start(FakeSpawner::new(FakeScript::default()), settings()).await;

    let worker = pool.next_ready_worker().await.unwrap();
    let requests: Vec<QueryRequest> = (0..4).map(|i| request(&format!("q-{i}"))).collect();
    pool.execute_batch_on_worker(worker, requests, Duration::from_secs(1))
        .await
        .unwrap();

    let stats = pool.stats().await;
    assert_eq!(stats.dispatched, 4);
    assert_eq!(stats.succeeded, 4);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.active_workers, 2);
    assert_eq!(stats.pending_queries, 0);
    let loaded: i64 = stats.workers.iter().map(|w| w.query_count).sum();
    assert_eq!(loaded, 4);
    pool.shutdown().await;
}
