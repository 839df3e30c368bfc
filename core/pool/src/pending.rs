//! Registry of dispatched requests awaiting results.
//!
//! Every dispatched request has exactly one entry until it is resolved or
//! timed out. Removal always precedes delivery, so completion is
//! single-assignment; late results for unknown ids are logged and dropped.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::sync::oneshot;

use crate::outcome::QueryOutcome;
use tally_protocol::QueryResult;
use tally_protocol::WireError;

struct PendingEntry {
    sender: oneshot::Sender<QueryOutcome>,
    worker_index: usize,
}

/// The pending-query table.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a request before it is sent to `worker_index`.
    pub(crate) async fn register(
        &self,
        id: String,
        worker_index: usize,
    ) -> oneshot::Receiver<QueryOutcome> {
        let (sender, receiver) = oneshot::channel();
        let mut entries = self.entries.lock().await;
        if entries
            .insert(
                id.clone(),
                PendingEntry {
                    sender,
                    worker_index,
                },
            )
            .is_some()
        {
            tracing::warn!(id = id.as_str(), "Replaced pending entry with duplicate id");
        }
        receiver
    }

    /// Deliver a worker result. Returns false for unknown (late) ids.
    pub(crate) async fn complete(&self, wire: QueryResult) -> bool {
        let entry = self.entries.lock().await.remove(&wire.id);
        match entry {
            Some(entry) => {
                let _ = entry.sender.send(QueryOutcome::from_wire(wire));
                true
            }
            None => {
                tracing::warn!(
                    id = wire.id.as_str(),
                    "Dropping result for unknown query (already resolved or timed out)"
                );
                false
            }
        }
    }

    /// Remove an entry without delivering. Returns true when it was present;
    /// used by the timeout path, which then resolves the caller itself.
    pub(crate) async fn remove(&self, id: &str) -> bool {
        self.entries.lock().await.remove(id).is_some()
    }

    /// Fail every entry owned by `worker_index`. Returns how many were failed.
    pub(crate) async fn fail_worker(
        &self,
        worker_index: usize,
        make_error: impl Fn(&str) -> WireError,
    ) -> usize {
        let owned: Vec<(String, PendingEntry)> = {
            let mut entries = self.entries.lock().await;
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.worker_index == worker_index)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        let count = owned.len();
        for (id, entry) in owned {
            let error = make_error(&id);
            let _ = entry.sender.send(QueryOutcome::failure(id, error));
        }
        count
    }

    /// Fail every entry. Returns how many were failed.
    pub(crate) async fn fail_all(&self, make_error: impl Fn(&str) -> WireError) -> usize {
        let drained: Vec<(String, PendingEntry)> =
            self.entries.lock().await.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            let error = make_error(&id);
            let _ = entry.sender.send(QueryOutcome::failure(id, error));
        }
        count
    }

    /// Number of in-flight entries.
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
#[path = "pending.test.rs"]
mod tests;
