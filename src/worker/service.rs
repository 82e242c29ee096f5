//! Background reindex service
//!
//! Runs several worker loops against one queue on tokio tasks. Each loop
//! has its own lease holder identity; all of them share statistics and the
//! version manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{ReindexWorker, WorkerStats, WorkerStatsSnapshot};

/// Pause after a loop-level failure (queue unreachable and the like)
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Pool of reindex worker loops with graceful shutdown
pub struct ReindexService {
    is_running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    workers: Vec<JoinHandle<()>>,
}

impl ReindexService {
    /// Spawn `concurrency` loops driving copies of `worker`
    #[must_use]
    pub fn start(worker: ReindexWorker, concurrency: usize) -> Self {
        let is_running = Arc::new(AtomicBool::new(true));
        let stats = Arc::clone(worker.stats());
        let concurrency = concurrency.max(1);

        let workers = (0..concurrency)
            .map(|slot| {
                let worker = worker.fork();
                let running = Arc::clone(&is_running);
                tokio::spawn(async move { Self::worker_loop(slot, worker, running).await })
            })
            .collect();

        tracing::info!(workers = concurrency, "Reindex service started");
        Self {
            is_running,
            stats,
            workers,
        }
    }

    async fn worker_loop(slot: usize, worker: ReindexWorker, is_running: Arc<AtomicBool>) {
        while is_running.load(Ordering::Relaxed) {
            if let Err(e) = worker.run_once().await {
                tracing::error!(worker = slot, error = %e, "Reindex worker loop error");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
        tracing::debug!(worker = slot, "Reindex worker stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop taking new jobs and wait for in-flight ones to finish
    pub async fn shutdown(self) -> WorkerStatsSnapshot {
        self.is_running.store(false, Ordering::Relaxed);
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Reindex worker task panicked");
            }
        }
        let snapshot = self.stats.snapshot();
        tracing::info!(
            completed = snapshot.jobs_completed,
            retried = snapshot.jobs_retried,
            dropped = snapshot.jobs_dropped,
            "Reindex service stopped"
        );
        snapshot
    }
}
