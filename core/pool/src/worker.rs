//! The worker seam: how the pool talks to one worker process.
//!
//! [`WorkerSpawner`] produces [`WorkerLink`]s — channel bundles the pool
//! drives a worker through. The production implementation,
//! [`ProcessSpawner`], launches the `tally-worker` binary and bridges its
//! stdio; tests substitute in-process fakes behind the same trait.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;
use crate::error::Result;
use tally_protocol::Message;
use tally_protocol::read_message;
use tally_protocol::write_message;

/// Channel capacity between the pool and one worker.
const CHANNEL_CAPACITY: usize = 64;

/// How a worker process ended.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Human-readable description of the exit.
    pub message: String,
}

impl WorkerExit {
    /// Whether the exit was a clean, zero-status termination.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

/// Channel bundle connecting the pool to one spawned worker.
pub struct WorkerLink {
    /// Messages to the worker.
    pub sender: mpsc::Sender<Message>,
    /// Messages from the worker.
    pub receiver: mpsc::Receiver<Message>,
    /// Resolves when the worker process exits.
    pub exit: oneshot::Receiver<WorkerExit>,
    /// Cancel to force-kill the worker.
    pub kill: CancellationToken,
}

/// Produces workers for the pool.
#[async_trait]
pub trait WorkerSpawner: Send + Sync + 'static {
    /// Launch a worker for slot `index`.
    async fn spawn(&self, index: usize) -> Result<WorkerLink>;
}

/// Spawns real `tally-worker` child processes.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
}

impl ProcessSpawner {
    /// Spawn workers from an explicit binary path.
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Spawn the `tally-worker` binary expected beside the current
    /// executable.
    pub fn sibling_worker() -> Result<Self> {
        let current = std::env::current_exe().map_err(|e| PoolError::SpawnFailed {
            index: 0,
            cause: format!("cannot locate current executable: {e}"),
        })?;
        let program = current
            .parent()
            .map(|dir| dir.join("tally-worker"))
            .unwrap_or_else(|| PathBuf::from("tally-worker"));
        Ok(Self { program })
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, index: usize) -> Result<WorkerLink> {
        let mut child = tokio::process::Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PoolError::SpawnFailed {
                index,
                cause: format!("{}: {e}", self.program.display()),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| PoolError::SpawnFailed {
            index,
            cause: "worker stdin was not piped".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| PoolError::SpawnFailed {
            index,
            cause: "worker stdout was not piped".to_string(),
        })?;

        let (to_worker_tx, mut to_worker_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (from_worker_tx, from_worker_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let kill = CancellationToken::new();

        // Writer: pool → child stdin.
        tokio::spawn(async move {
            while let Some(message) = to_worker_rx.recv().await {
                if let Err(e) = write_message(&mut stdin, &message).await {
                    tracing::warn!(worker = index, error = %e, "Failed to write to worker");
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        // Reader: child stdout → pool. Undecodable lines are logged and
        // skipped so one garbled reply cannot wedge the channel.
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_message(&mut reader).await {
                    Ok(Some(message)) => {
                        if from_worker_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(worker = index, error = %e, "Undecodable worker message");
                    }
                }
            }
        });

        // Supervisor: owns the child, reports its exit, applies force-kill.
        let supervisor_kill = kill.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = supervisor_kill.cancelled() => {
                    tracing::warn!(worker = index, "Force-killing worker");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(worker = index, error = %e, "Kill failed");
                    }
                    child.wait().await
                }
            };
            let exit = match status {
                Ok(status) => WorkerExit {
                    code: status.code(),
                    message: status.to_string(),
                },
                Err(e) => WorkerExit {
                    code: None,
                    message: format!("wait failed: {e}"),
                },
            };
            let _ = exit_tx.send(exit);
        });

        Ok(WorkerLink {
            sender: to_worker_tx,
            receiver: from_worker_rx,
            exit: exit_rx,
            kill,
        })
    }
}
