//! In-process job queue
//!
//! Lock-free FIFO of ready delivery ids plus a concurrent map of every
//! unacknowledged job. A dequeued job keeps its slot with an invisibility
//! deadline; once the deadline passes it goes back to the ready queue.

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Delivery, DeliveryId, QueueBackend, ReindexJob};
use crate::errors::{SyncError, SyncResult};

/// Upper bound on one wait slice, so expired deliveries are noticed promptly
const POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Slot {
    job: ReindexJob,
    attempt: u32,
    /// `None` while waiting in the ready queue
    invisible_until: Option<Instant>,
}

#[derive(Debug)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

/// Queue living in this process's memory
#[derive(Debug)]
pub struct MemoryQueue {
    next_id: AtomicU64,
    ready: SegQueue<DeliveryId>,
    slots: DashMap<DeliveryId, Slot>,
    leases: DashMap<String, Lease>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ready: SegQueue::new(),
            slots: DashMap::new(),
            leases: DashMap::new(),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    /// Move deliveries whose visibility deadline passed back to ready
    fn requeue_expired(&self, now: Instant) {
        for mut slot in self.slots.iter_mut() {
            if slot.invisible_until.is_some_and(|deadline| deadline <= now) {
                slot.invisible_until = None;
                log::debug!("Delivery {} became visible again", slot.key());
                self.ready.push(*slot.key());
            }
        }
    }

    fn try_claim(&self, now: Instant) -> Option<Delivery> {
        while let Some(id) = self.ready.pop() {
            // Acked while waiting, or already claimed through a stale entry
            let Some(mut slot) = self.slots.get_mut(&id) else {
                continue;
            };
            if slot.invisible_until.is_some() {
                continue;
            }
            slot.attempt += 1;
            slot.invisible_until = Some(now + self.visibility_timeout);
            return Some(Delivery {
                id,
                attempt: slot.attempt,
                job: slot.job.clone(),
            });
        }
        None
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::utils::DEFAULT_VISIBILITY_TIMEOUT_SECS))
    }
}

impl QueueBackend for MemoryQueue {
    fn enqueue<'a>(&'a self, job: ReindexJob) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Enqueued {:?} job {id} for {} ({} ids)",
                job.kind(),
                job.entity_type(),
                job.ids().len()
            );
            self.slots.insert(
                id,
                Slot {
                    job,
                    attempt: 0,
                    invisible_until: None,
                },
            );
            self.ready.push(id);
            self.notify.notify_one();
            Ok(())
        })
    }

    fn dequeue<'a>(&'a self, wait: Duration) -> BoxFuture<'a, SyncResult<Option<Delivery>>> {
        Box::pin(async move {
            let deadline = Instant::now() + wait;
            loop {
                let notified = self.notify.notified();
                let now = Instant::now();
                self.requeue_expired(now);
                if let Some(delivery) = self.try_claim(now) {
                    return Ok(Some(delivery));
                }
                if now >= deadline {
                    return Ok(None);
                }
                let slice = (deadline - now).min(POLL_SLICE);
                let _ = tokio::time::timeout(slice, notified).await;
            }
        })
    }

    fn ack<'a>(&'a self, id: DeliveryId) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            self.slots.remove(&id);
            Ok(())
        })
    }

    fn nack<'a>(&'a self, id: DeliveryId, delay: Duration) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            let Some(mut slot) = self.slots.get_mut(&id) else {
                return Err(SyncError::Queue(format!("unknown delivery {id}")));
            };
            if delay.is_zero() {
                slot.invisible_until = None;
                drop(slot);
                self.ready.push(id);
                self.notify.notify_one();
            } else {
                slot.invisible_until = Some(Instant::now() + delay);
            }
            Ok(())
        })
    }

    fn len<'a>(&'a self) -> BoxFuture<'a, SyncResult<usize>> {
        Box::pin(async move { Ok(self.slots.len()) })
    }

    fn try_acquire_lease<'a>(
        &'a self,
        key: &'a str,
        holder: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, SyncResult<bool>> {
        Box::pin(async move {
            let now = Instant::now();
            let mut lease = self.leases.entry(key.to_string()).or_insert_with(|| Lease {
                holder: holder.to_string(),
                expires_at: now,
            });
            if lease.holder != holder && lease.expires_at > now {
                return Ok(false);
            }
            lease.holder = holder.to_string();
            lease.expires_at = now + ttl;
            Ok(true)
        })
    }

    fn release_lease<'a>(&'a self, key: &'a str, holder: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            self.leases.remove_if(key, |_, lease| lease.holder == holder);
            Ok(())
        })
    }
}
