/* src/health.rs */

use crate::nameserver::NameServer;
use chrono::{DateTime, Utc};
use fancy_log::{LogLevel, log};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};

/// Status feed messages are never pushed more often than this.
pub const FEED_MIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub reachable: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub detail: String,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            reachable: false,
            last_checked: None,
            detail: "not probed yet".to_string(),
        }
    }
}

/// Tracks whether the authoritative name server answers.
///
/// The snapshot lock is only taken to copy or replace a finished snapshot,
/// never while a probe is in flight.
#[derive(Clone)]
pub struct HealthMonitor {
    server: Arc<dyn NameServer>,
    probe_timeout: Duration,
    snapshot: Arc<RwLock<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(server: Arc<dyn NameServer>, probe_timeout: Duration) -> Self {
        Self {
            server,
            probe_timeout,
            snapshot: Arc::new(RwLock::new(HealthSnapshot::default())),
        }
    }

    pub fn current(&self) -> HealthSnapshot {
        self.snapshot.read().clone()
    }

    /// Probes once and replaces the snapshot with the result.
    pub async fn probe(&self) -> HealthSnapshot {
        let result = match timeout(self.probe_timeout, self.server.probe()).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "name server did not answer within {:?}",
                self.probe_timeout
            )),
        };

        let next = match result {
            Ok(detail) => HealthSnapshot {
                status: HealthStatus::Up,
                reachable: true,
                last_checked: Some(Utc::now()),
                detail,
            },
            Err(detail) => HealthSnapshot {
                status: HealthStatus::Down,
                reachable: false,
                last_checked: Some(Utc::now()),
                detail,
            },
        };

        let previous = std::mem::replace(&mut *self.snapshot.write(), next.clone());
        if previous.status != next.status {
            match next.status {
                HealthStatus::Up => log(
                    LogLevel::Info,
                    &format!("Name server is reachable ({}).", next.detail),
                ),
                _ => log(
                    LogLevel::Warn,
                    &format!("Name server is unreachable: {}", next.detail),
                ),
            }
        }
        next
    }

    /// Probes now and then every `every` until the handle is aborted.
    pub fn start(&self, every: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = monitor.probe().await;
                if !snapshot.reachable {
                    log(
                        LogLevel::Debug,
                        &format!("Next name server probe in {:?}", every),
                    );
                }
                sleep(every).await;
            }
        })
    }

    /// Live status feed: the current snapshot as JSON right away, then once
    /// per period (at least `FEED_MIN_INTERVAL`). Stops when the consumer
    /// goes away.
    pub fn feed(&self, every: Duration) -> StatusFeed {
        let period = every.max(FEED_MIN_INTERVAL);
        let (tx, rx) = mpsc::channel(1);
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let fragment = match serde_json::to_string(&monitor.current()) {
                            Ok(fragment) => fragment,
                            Err(e) => {
                                log(LogLevel::Error, &format!("Failed to encode status: {}", e));
                                continue;
                            }
                        };
                        if tx.send(fragment).await.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            log(LogLevel::Debug, "Status feed closed");
        });

        StatusFeed { rx, task }
    }
}

/// Receiving end of a live status feed.
pub struct StatusFeed {
    rx: mpsc::Receiver<String>,
    task: JoinHandle<()>,
}

impl StatusFeed {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Disconnects and waits for the feed task to wind down.
    pub async fn close(self) {
        drop(self.rx);
        let _ = self.task.await;
    }
}
