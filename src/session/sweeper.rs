//! Periodic removal of expired sessions and their on-disk artifacts.

use super::store::SessionStore;
use crate::metrics::ServiceMetrics;
use crate::storage::remove_artifacts;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Result of one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions whose artifacts were removed and which were deregistered.
    pub purged: Vec<String>,
    /// Sessions left registered because removing their artifacts failed.
    pub failed: Vec<String>,
}

/// Expires sessions older than the configured TTL.
pub struct Sweeper {
    store: Arc<dyn SessionStore>,
    expiry: Duration,
    interval: Duration,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl Sweeper {
    /// Sweeper removing sessions older than `expiry`, running every `interval` once spawned.
    pub fn new(store: Arc<dyn SessionStore>, expiry: Duration, interval: Duration) -> Self {
        Self {
            store,
            expiry,
            interval,
            metrics: None,
        }
    }

    /// Count purged sessions in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run a single pass against `now`.
    ///
    /// Files go first, then the registry entry, so a session is never deregistered while its
    /// artifacts remain. A failure on one entry is logged and the pass moves on; the entry stays
    /// registered and is retried next pass.
    pub async fn sweep_once(&self, now: OffsetDateTime) -> SweepReport {
        let mut report = SweepReport::default();

        for entry in self.store.list_expired(now, self.expiry).await {
            match remove_artifacts(&entry.index_dir, &entry.upload_path).await {
                Ok(removed) => {
                    self.store.delete(&entry.session_id).await;
                    tracing::info!(
                        session_id = %entry.session_id,
                        index_removed = removed.index_dir,
                        upload_removed = removed.upload,
                        "Expired session removed"
                    );
                    report.purged.push(entry.session_id);
                }
                Err(error) => {
                    tracing::error!(
                        session_id = %entry.session_id,
                        error = %error,
                        "Failed to remove expired session artifacts"
                    );
                    report.failed.push(entry.session_id);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_purged(report.purged.len() as u64);
        }
        if !report.purged.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                purged = report.purged.len(),
                failed = report.failed.len(),
                "Session sweep finished"
            );
        }
        report
    }

    /// Start sweeping on a background task. The first pass runs one interval after spawning.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once(OffsetDateTime::now_utc()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Session sweeper stopping");
                        break;
                    }
                }
            }
        });

        tracing::info!(interval_secs = period.as_secs(), "Session sweeper started");
        SweeperHandle { shutdown_tx, task }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for an in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(error) = self.task.await {
            tracing::error!(error = %error, "Session sweeper task failed");
        }
    }
}
