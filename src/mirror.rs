/* src/mirror.rs */

//! Ordered, best-effort propagation of committed store changes to the name
//! server.
//!
//! The store enqueues jobs while it still holds its write lock, so the queue
//! order is the commit order. A single worker drains the queue; callers wait
//! for the acknowledgement only after the lock is released, and only up to
//! the mirror timeout.

use crate::error::NameServerError;
use crate::nameserver::{MirrorAction, NameServer};
use crate::records::Record;
use fancy_log::{LogLevel, log};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout, timeout_at};

/// How the name server took a committed local change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorStatus {
    /// Every change was acknowledged by the server.
    Synced,
    /// Still queued or in flight when the caller stopped waiting.
    Pending,
    /// The local change stands, but the server did not take it.
    Failed(NameServerError),
}

impl MirrorStatus {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, MirrorStatus::Synced)
    }
}

struct MirrorJob {
    action: MirrorAction,
    record: Record,
    ack: oneshot::Sender<Result<(), NameServerError>>,
}

#[derive(Debug, Default)]
struct MirrorStats {
    failures: AtomicU64,
    last_error: Mutex<Option<NameServerError>>,
}

pub(crate) struct PendingMirror {
    acks: Vec<oneshot::Receiver<Result<(), NameServerError>>>,
}

#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::UnboundedSender<MirrorJob>,
    ack_timeout: Duration,
    stats: Arc<MirrorStats>,
}

impl MirrorHandle {
    /// Spawns the worker. Each apply is bounded by `apply_timeout`, and callers
    /// wait at most that long for their acknowledgements.
    pub fn spawn(server: Arc<dyn NameServer>, apply_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(MirrorStats::default());
        tokio::spawn(run_worker(server, rx, apply_timeout, stats.clone()));
        Self {
            tx,
            ack_timeout: apply_timeout,
            stats,
        }
    }

    /// Never blocks; safe to call under the store lock.
    pub(crate) fn enqueue(&self, changes: Vec<(MirrorAction, Record)>) -> PendingMirror {
        let mut acks = Vec::with_capacity(changes.len());
        for (action, record) in changes {
            let (ack, rx) = oneshot::channel();
            // If the worker is gone the job, and with it `ack`, is dropped
            // and `rx` resolves to an error.
            let _ = self.tx.send(MirrorJob { action, record, ack });
            acks.push(rx);
        }
        PendingMirror { acks }
    }

    pub(crate) async fn settle(&self, pending: PendingMirror) -> MirrorStatus {
        let deadline = Instant::now() + self.ack_timeout;
        for ack in pending.acks {
            match timeout_at(deadline, ack).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => return MirrorStatus::Failed(e),
                Ok(Err(_)) => {
                    return MirrorStatus::Failed(NameServerError::Unavailable(
                        "mirror worker stopped".to_string(),
                    ));
                }
                Err(_) => return MirrorStatus::Pending,
            }
        }
        MirrorStatus::Synced
    }

    /// Number of changes the name server did not take since startup.
    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<NameServerError> {
        self.stats.last_error.lock().clone()
    }
}

async fn run_worker(
    server: Arc<dyn NameServer>,
    mut rx: mpsc::UnboundedReceiver<MirrorJob>,
    apply_timeout: Duration,
    stats: Arc<MirrorStats>,
) {
    while let Some(job) = rx.recv().await {
        let result = match timeout(apply_timeout, server.apply(&job.record, job.action)).await {
            Ok(result) => result,
            Err(_) => Err(NameServerError::Timeout(apply_timeout)),
        };

        match &result {
            Ok(()) => log(
                LogLevel::Debug,
                &format!("Mirrored {} {}", job.action, job.record),
            ),
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                *stats.last_error.lock() = Some(e.clone());
                log(
                    LogLevel::Error,
                    &format!("Failed to mirror {} {}: {}", job.action, job.record, e),
                );
            }
        }

        // The caller may have stopped waiting.
        let _ = job.ack.send(result);
    }
    log(LogLevel::Debug, "Mirror worker stopped");
}
