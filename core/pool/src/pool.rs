//! The process pool manager.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PoolError;
use crate::error::Result;
use crate::outcome::QueryOutcome;
use crate::pending::PendingTable;
use crate::settings::PoolSettings;
use crate::stats::PoolStats;
use crate::stats::PoolStatsSnapshot;
use crate::stats::WorkerStatsSnapshot;
use tally_protocol::Message;
use tally_protocol::QueryRequest;
use tally_protocol::WireError;

use crate::worker::WorkerExit;
use crate::worker::WorkerLink;
use crate::worker::WorkerSpawner;

/// Poll interval while waiting for workers to exit during shutdown.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(25);

type ReadySignal = oneshot::Sender<std::result::Result<(), String>>;

/// One worker slot in the roster.
///
/// A not-ready slot receives no new work. A slot removed on crash is
/// replaced by a new worker carrying the same `index`.
#[derive(Clone)]
struct WorkerSlot {
    index: usize,
    ready: bool,
    sender: mpsc::Sender<Message>,
    kill: CancellationToken,
    counters: Arc<WorkerCounters>,
}

#[derive(Debug, Default)]
struct WorkerCounters {
    query_count: AtomicI64,
    error_count: AtomicI64,
}

/// Manager of a fleet of worker processes.
///
/// Forks, monitors, restarts and terminates workers; assigns batches via a
/// round-robin cursor over ready workers; tracks per-worker and aggregate
/// statistics; shuts down gracefully.
pub struct ProcessPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    spawner: Arc<dyn WorkerSpawner>,
    settings: PoolSettings,
    slots: Mutex<Vec<WorkerSlot>>,
    pending: PendingTable,
    stats: PoolStats,
    cursor: AtomicUsize,
    shutting_down: AtomicBool,
    init_error: Mutex<Option<String>>,
}

impl ProcessPool {
    /// Start the pool, spawning workers in parallel.
    ///
    /// A worker counts as created only once it reports `READY` within the
    /// init timeout; stragglers are killed. When zero workers come up the
    /// pool still returns — degraded — and execution calls surface the
    /// initialization error.
    pub async fn start(spawner: impl WorkerSpawner, settings: PoolSettings) -> Self {
        let inner = Arc::new(PoolInner {
            spawner: Arc::new(spawner),
            settings,
            slots: Mutex::new(Vec::new()),
            pending: PendingTable::new(),
            stats: PoolStats::default(),
            cursor: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            init_error: Mutex::new(None),
        });

        let count = inner.settings.effective_worker_count();
        tracing::info!(workers = count, "Starting worker pool");

        let spawns = (0..count).map(|index| {
            let inner = Arc::clone(&inner);
            async move { inner.spawn_worker(index).await }
        });
        let results = futures::future::join_all(spawns).await;

        let mut live = 0;
        let mut first_error: Option<String> = None;
        for result in results {
            match result {
                Ok(()) => live += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Worker failed to start");
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                }
            }
        }
        if live == 0 {
            let cause =
                first_error.unwrap_or_else(|| "no workers were initialized".to_string());
            tracing::error!(cause = cause.as_str(), "Pool is degraded: zero live workers");
            *inner.init_error.lock().await = Some(cause);
        } else {
            tracing::info!(live, "Worker pool started");
        }

        Self { inner }
    }

    /// Send one batch to a specific worker and await all its results.
    ///
    /// Results are aligned to the input order. Per-request timeouts are
    /// independent; a timeout resolves that request with an error result
    /// and does not kill the worker. A transport failure fails only this
    /// batch's requests, reported as error results rather than an `Err`.
    pub async fn execute_batch_on_worker(
        &self,
        worker_index: usize,
        requests: Vec<QueryRequest>,
        timeout: Duration,
    ) -> Result<Vec<QueryOutcome>> {
        self.inner
            .execute_batch(worker_index, requests, timeout)
            .await
    }

    /// Send one query to a specific worker and await its result.
    ///
    /// The single-message sibling of [`Self::execute_batch_on_worker`], with
    /// the same timeout and error semantics.
    pub async fn execute_on_worker(
        &self,
        worker_index: usize,
        request: QueryRequest,
        timeout: Duration,
    ) -> Result<QueryOutcome> {
        self.inner
            .execute_single(worker_index, request, timeout)
            .await
    }

    /// Pick the next worker by round-robin over ready workers.
    pub async fn next_ready_worker(&self) -> Result<usize> {
        self.inner.next_ready_worker().await
    }

    /// Snapshot of workers whose ready flag is set.
    pub async fn ready_workers(&self) -> Vec<WorkerStatsSnapshot> {
        let slots = self.inner.slots.lock().await;
        slots
            .iter()
            .filter(|slot| slot.ready)
            .map(snapshot_slot)
            .collect()
    }

    /// Aggregate and per-worker statistics.
    pub async fn stats(&self) -> PoolStatsSnapshot {
        let workers: Vec<WorkerStatsSnapshot> = {
            let slots = self.inner.slots.lock().await;
            slots.iter().map(snapshot_slot).collect()
        };
        PoolStatsSnapshot {
            dispatched: self.inner.stats.dispatched(),
            succeeded: self.inner.stats.succeeded(),
            failed: self.inner.stats.failed(),
            restarted_workers: self.inner.stats.restarted_workers(),
            active_workers: workers.len() as i64,
            pending_queries: self.inner.pending.len().await as i64,
            workers,
        }
    }

    /// Number of requests currently awaiting results.
    pub async fn pending_queries(&self) -> usize {
        self.inner.pending.len().await
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Gracefully stop the pool. Idempotent.
    ///
    /// All pending entries are rejected with a shutdown error, every worker
    /// is asked to exit, and whatever is still alive after the grace period
    /// is force-killed.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

impl PoolInner {
    fn spawn_worker(
        self: &Arc<Self>,
        index: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.shutting_down.load(Ordering::Acquire) {
                return Err(PoolError::ShuttingDown);
            }
            let link = self.spawner.spawn(index).await?;
            let WorkerLink {
                sender,
                receiver,
                exit,
                kill,
            } = link;

            sender
                .send(Message::Init {
                    connection_string: self.settings.connection_string.clone(),
                    database_name: self.settings.database_name.clone(),
                    database_options: self.settings.database_options.clone(),
                })
                .await
                .map_err(|_| PoolError::WorkerInit {
                    index,
                    cause: "worker channel closed before INIT".to_string(),
                })?;

            let slot = WorkerSlot {
                index,
                ready: false,
                sender,
                kill: kill.clone(),
                counters: Arc::new(WorkerCounters::default()),
            };
            self.insert_slot(slot).await;

            let (ready_tx, ready_rx) = oneshot::channel();
            let task_inner = Arc::clone(self);
            tokio::spawn(async move {
                task_inner.worker_task(index, receiver, exit, ready_tx).await;
            });

            let timeout = Duration::from_millis(self.settings.worker_init_timeout_ms.max(1) as u64);
            match tokio::time::timeout(timeout, ready_rx).await {
                Ok(Ok(Ok(()))) => {
                    self.set_ready(index, true).await;
                    tracing::info!(worker = index, "Worker ready");
                    Ok(())
                }
                Ok(Ok(Err(cause))) => {
                    self.remove_slot(index).await;
                    kill.cancel();
                    Err(PoolError::WorkerInit { index, cause })
                }
                Ok(Err(_)) => {
                    self.remove_slot(index).await;
                    kill.cancel();
                    Err(PoolError::WorkerInit {
                        index,
                        cause: "worker exited during initialization".to_string(),
                    })
                }
                Err(_) => {
                    self.remove_slot(index).await;
                    kill.cancel();
                    tracing::warn!(worker = index, "Worker did not report READY in time; killed");
                    Err(PoolError::InitTimeout { index })
                }
            }
        })
    }

    /// Per-worker message loop: routes replies into the pending table and
    /// reacts to the worker going away.
    async fn worker_task(
        self: Arc<Self>,
        index: usize,
        mut receiver: mpsc::Receiver<Message>,
        mut exit: oneshot::Receiver<WorkerExit>,
        ready_tx: ReadySignal,
    ) {
        let mut ready_tx = Some(ready_tx);
        let mut became_ready = false;
        let mut exit_info: Option<WorkerExit> = None;

        loop {
            tokio::select! {
                biased;

                maybe = receiver.recv() => match maybe {
                    Some(message) => {
                        self.handle_worker_message(index, message, &mut ready_tx, &mut became_ready)
                            .await;
                    }
                    None => break,
                },

                result = &mut exit => {
                    if let Ok(info) = result {
                        exit_info = Some(info);
                    }
                    break;
                }
            }
        }

        // Deliver results that raced with the exit notification.
        while let Ok(message) = receiver.try_recv() {
            self.handle_worker_message(index, message, &mut ready_tx, &mut became_ready)
                .await;
        }
        if exit_info.is_none() {
            exit_info = exit.try_recv().ok();
        }

        self.handle_worker_gone(index, became_ready, exit_info).await;
    }

    async fn handle_worker_message(
        &self,
        index: usize,
        message: Message,
        ready_tx: &mut Option<ReadySignal>,
        became_ready: &mut bool,
    ) {
        match message {
            Message::Ready => {
                *became_ready = true;
                match ready_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    None => tracing::warn!(worker = index, "Spurious READY from worker"),
                }
            }
            Message::Error { message } => match ready_tx.take() {
                Some(tx) => {
                    let _ = tx.send(Err(message));
                }
                None => {
                    tracing::warn!(worker = index, error = message.as_str(), "Worker error")
                }
            },
            Message::Result(result) => {
                self.pending.complete(result).await;
            }
            Message::ResultBatch { results, .. } => {
                for result in results {
                    self.pending.complete(result).await;
                }
            }
            other => {
                tracing::warn!(worker = index, "Unexpected message from worker: {other:?}");
            }
        }
    }

    /// The worker's channel closed or its process exited.
    async fn handle_worker_gone(
        self: &Arc<Self>,
        index: usize,
        became_ready: bool,
        exit: Option<WorkerExit>,
    ) {
        let removed = self.remove_slot(index).await;
        if self.shutting_down.load(Ordering::Acquire) {
            tracing::debug!(worker = index, "Worker exited during shutdown");
            return;
        }
        if !removed {
            // The init path already reported and cleaned up this slot.
            return;
        }
        let description = exit
            .map(|info| info.message)
            .unwrap_or_else(|| "channel closed".to_string());
        if !became_ready {
            tracing::warn!(
                worker = index,
                exit = description.as_str(),
                "Worker exited before becoming ready"
            );
            return;
        }

        // Eagerly cancel the dead worker's in-flight queries; their own
        // timeouts remain the backstop.
        let cancelled = self
            .pending
            .fail_worker(index, |id| {
                WireError::new(
                    "WorkerExitError",
                    format!("query {id} aborted: worker exited ({description})"),
                )
            })
            .await;
        if cancelled > 0 {
            tracing::warn!(
                worker = index,
                cancelled,
                "Cancelled pending queries owned by dead worker"
            );
        }

        self.stats.record_restart();
        tracing::warn!(
            worker = index,
            exit = description.as_str(),
            "Worker exited unexpectedly; restarting"
        );
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = inner.spawn_worker(index).await {
                tracing::error!(worker = index, error = %e, "Failed to restart worker");
            }
        });
    }

    async fn execute_batch(
        self: &Arc<Self>,
        worker_index: usize,
        requests: Vec<QueryRequest>,
        timeout: Duration,
    ) -> Result<Vec<QueryOutcome>> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }
        if let Some(cause) = self.init_error.lock().await.clone() {
            return Err(PoolError::NotInitialized { cause });
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let slot = self
            .get_slot(worker_index)
            .await
            .ok_or(PoolError::WorkerNotReady {
                index: worker_index,
            })?;
        if !slot.ready {
            return Err(PoolError::WorkerNotReady {
                index: worker_index,
            });
        }

        // Registration happens-before the send that can produce results.
        let mut waiters = Vec::with_capacity(requests.len());
        for request in &requests {
            let receiver = self.pending.register(request.id.clone(), worker_index).await;
            waiters.push((request.id.clone(), receiver));
        }
        self.stats.record_dispatched(requests.len() as i64);
        slot.counters
            .query_count
            .fetch_add(requests.len() as i64, Ordering::AcqRel);

        let batch_id = Uuid::new_v4().to_string();
        tracing::debug!(
            worker = worker_index,
            batch = batch_id.as_str(),
            requests = requests.len(),
            "Dispatching batch"
        );
        if slot
            .sender
            .send(Message::QueryBatch { batch_id, requests })
            .await
            .is_err()
        {
            let mut outcomes = Vec::with_capacity(waiters.len());
            for (id, _receiver) in waiters {
                self.pending.remove(&id).await;
                self.stats.record_failed();
                slot.counters.error_count.fetch_add(1, Ordering::AcqRel);
                let error = WireError::new(
                    "SendError",
                    format!("query {id} failed: worker {worker_index} channel closed"),
                );
                outcomes.push(QueryOutcome::failure(id, error));
            }
            return Ok(outcomes);
        }

        let waits = waiters.into_iter().map(|(id, receiver)| {
            self.await_outcome(id, receiver, worker_index, timeout, Arc::clone(&slot.counters))
        });
        Ok(futures::future::join_all(waits).await)
    }

    async fn execute_single(
        self: &Arc<Self>,
        worker_index: usize,
        request: QueryRequest,
        timeout: Duration,
    ) -> Result<QueryOutcome> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }
        if let Some(cause) = self.init_error.lock().await.clone() {
            return Err(PoolError::NotInitialized { cause });
        }
        let slot = self
            .get_slot(worker_index)
            .await
            .ok_or(PoolError::WorkerNotReady {
                index: worker_index,
            })?;
        if !slot.ready {
            return Err(PoolError::WorkerNotReady {
                index: worker_index,
            });
        }

        let id = request.id.clone();
        let receiver = self.pending.register(id.clone(), worker_index).await;
        self.stats.record_dispatched(1);
        slot.counters.query_count.fetch_add(1, Ordering::AcqRel);

        if slot.sender.send(Message::Query(request)).await.is_err() {
            self.pending.remove(&id).await;
            self.stats.record_failed();
            slot.counters.error_count.fetch_add(1, Ordering::AcqRel);
            let error = WireError::new(
                "SendError",
                format!("query {id} failed: worker {worker_index} channel closed"),
            );
            return Ok(QueryOutcome::failure(id, error));
        }

        Ok(self
            .await_outcome(id, receiver, worker_index, timeout, Arc::clone(&slot.counters))
            .await)
    }

    async fn await_outcome(
        &self,
        id: String,
        mut receiver: oneshot::Receiver<QueryOutcome>,
        worker_index: usize,
        timeout: Duration,
        counters: Arc<WorkerCounters>,
    ) -> QueryOutcome {
        let outcome = match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => cancelled_outcome(&id),
            Err(_) => {
                if self.pending.remove(&id).await {
                    tracing::warn!(
                        id = id.as_str(),
                        worker = worker_index,
                        timeout_ms = timeout.as_millis() as i64,
                        "Query timeout"
                    );
                    let error = WireError::new(
                        "TimeoutError",
                        format!("query {id} timeout after {}ms", timeout.as_millis()),
                    );
                    QueryOutcome::failure(id, error)
                } else {
                    // The completion already left the table; take it.
                    match receiver.await {
                        Ok(outcome) => outcome,
                        Err(_) => cancelled_outcome(&id),
                    }
                }
            }
        };
        if outcome.is_success() {
            self.stats.record_succeeded();
        } else {
            self.stats.record_failed();
            counters.error_count.fetch_add(1, Ordering::AcqRel);
        }
        outcome
    }

    async fn next_ready_worker(&self) -> Result<usize> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }
        let slots = self.slots.lock().await;
        if slots.is_empty() {
            if let Some(cause) = self.init_error.lock().await.clone() {
                return Err(PoolError::NotInitialized { cause });
            }
            return Err(PoolError::NoReadyWorkers);
        }
        let len = slots.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            let slot = &slots[(start + offset) % len];
            if slot.ready {
                return Ok(slot.index);
            }
        }
        Err(PoolError::NoReadyWorkers)
    }

    async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Shutting down worker pool");

        let rejected = self
            .pending
            .fail_all(|id| {
                WireError::new(
                    "ShutdownError",
                    format!("query {id} aborted: pool is shutting down"),
                )
            })
            .await;
        if rejected > 0 {
            tracing::warn!(rejected, "Rejected pending queries at shutdown");
        }

        let slots: Vec<WorkerSlot> = {
            let mut guard = self.slots.lock().await;
            for slot in guard.iter_mut() {
                slot.ready = false;
            }
            guard.clone()
        };
        for slot in &slots {
            if slot.sender.send(Message::Shutdown).await.is_err() {
                tracing::debug!(worker = slot.index, "Worker channel already closed");
            }
        }

        let grace = Duration::from_millis(self.settings.shutdown_grace_ms.max(0) as u64);
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.slots.lock().await.is_empty() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }

        let stragglers: Vec<WorkerSlot> = {
            let mut guard = self.slots.lock().await;
            guard.drain(..).collect()
        };
        for slot in stragglers {
            tracing::warn!(
                worker = slot.index,
                "Worker did not exit within the grace period; force-killing"
            );
            slot.kill.cancel();
        }
        tracing::info!("Worker pool shut down");
    }

    async fn insert_slot(&self, slot: WorkerSlot) {
        let mut slots = self.slots.lock().await;
        slots.retain(|existing| existing.index != slot.index);
        slots.push(slot);
        slots.sort_by_key(|existing| existing.index);
    }

    async fn remove_slot(&self, index: usize) -> bool {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|slot| slot.index != index);
        before != slots.len()
    }

    async fn set_ready(&self, index: usize, ready: bool) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.iter_mut().find(|slot| slot.index == index) {
            slot.ready = ready;
        }
    }

    async fn get_slot(&self, index: usize) -> Option<WorkerSlot> {
        let slots = self.slots.lock().await;
        slots.iter().find(|slot| slot.index == index).cloned()
    }
}

fn snapshot_slot(slot: &WorkerSlot) -> WorkerStatsSnapshot {
    WorkerStatsSnapshot {
        index: slot.index,
        ready: slot.ready,
        query_count: slot.counters.query_count.load(Ordering::Acquire),
        error_count: slot.counters.error_count.load(Ordering::Acquire),
    }
}

fn cancelled_outcome(id: &str) -> QueryOutcome {
    QueryOutcome::failure(
        id,
        WireError::new("CancelledError", format!("query {id} was cancelled")),
    )
}

#[cfg(test)]
#[path = "pool.test.rs"]
mod tests;
