//! Reindex job queues
//!
//! `QueueBackend` is the at-least-once queue the dispatcher pushes to and the
//! workers consume from. A dequeued job stays invisible to other consumers
//! until it is acknowledged, returned with `nack`, or its visibility timeout
//! expires, at which point it is delivered again.
//!
//! The queue also stores named leases: expiring, holder-scoped locks that
//! every consumer of the same queue observes. Rebuilds use them for
//! per-entity-type mutual exclusion.

pub mod job;
pub mod memory;
pub mod sqlite;

pub use job::{JobKind, ReindexJob};
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use futures::future::BoxFuture;
use std::time::Duration;

use crate::errors::SyncResult;

/// Identifier of one delivery, used to ack or nack it
pub type DeliveryId = u64;

/// A job handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: DeliveryId,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
    pub job: ReindexJob,
}

/// Job queue consumed by reindex workers
pub trait QueueBackend: Send + Sync {
    fn enqueue<'a>(&'a self, job: ReindexJob) -> BoxFuture<'a, SyncResult<()>>;

    /// Wait up to `wait` for a job; `None` when the queue stayed empty
    fn dequeue<'a>(&'a self, wait: Duration) -> BoxFuture<'a, SyncResult<Option<Delivery>>>;

    /// Remove a delivered job for good
    fn ack<'a>(&'a self, id: DeliveryId) -> BoxFuture<'a, SyncResult<()>>;

    /// Make a delivered job visible again after `delay`
    fn nack<'a>(&'a self, id: DeliveryId, delay: Duration) -> BoxFuture<'a, SyncResult<()>>;

    /// Jobs not yet acknowledged, in flight or waiting
    fn len<'a>(&'a self) -> BoxFuture<'a, SyncResult<usize>>;

    /// Take or renew the lease `key` for `holder`
    ///
    /// Returns `false` while another holder's lease is unexpired.
    fn try_acquire_lease<'a>(
        &'a self,
        key: &'a str,
        holder: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, SyncResult<bool>>;

    /// Release `key` if `holder` still owns it
    fn release_lease<'a>(&'a self, key: &'a str, holder: &'a str) -> BoxFuture<'a, SyncResult<()>>;
}

/// Lease key guarding rebuilds of one entity type
#[must_use]
pub fn rebuild_lease_key(entity_type: &str) -> String {
    format!("rebuild:{entity_type}")
}
