//! Lock-free statistics for reindex workers
//!
//! One `WorkerStats` is shared by every worker loop of a service.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free worker statistics
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub jobs_completed: AtomicUsize,
    /// Failed deliveries handed back for redelivery
    pub jobs_retried: AtomicUsize,
    /// Jobs given up after exhausting their delivery attempts
    pub jobs_dropped: AtomicUsize,
    pub documents_indexed: AtomicUsize,
    pub documents_deleted: AtomicUsize,
    pub rebuilds_completed: AtomicUsize,
    pub rebuilds_failed: AtomicUsize,
}

impl WorkerStats {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    /// Get snapshot of current statistics
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            rebuilds_completed: self.rebuilds_completed.load(Ordering::Relaxed),
            rebuilds_failed: self.rebuilds_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of worker statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub jobs_completed: usize,
    pub jobs_retried: usize,
    pub jobs_dropped: usize,
    pub documents_indexed: usize,
    pub documents_deleted: usize,
    pub rebuilds_completed: usize,
    pub rebuilds_failed: usize,
}
