//! Reindex queue worker
//!
//! A worker takes deliveries from the queue and converges the search index
//! with the primary store. Id-list jobs re-read every id and either upsert
//! or delete it, so handling the same job twice reaches the same end state.
//! Rebuild jobs fill a fresh index version and swap it in (see `rebuild`).

pub mod rebuild;
pub mod service;
pub mod stats;

pub use rebuild::RebuildReport;
pub use service::ReindexService;
pub use stats::{WorkerStats, WorkerStatsSnapshot};

use ahash::AHashSet;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{BulkOperation, RequestOptions, SearchClient};
use crate::config::SyncConfig;
use crate::document::Indexable;
use crate::errors::{IdempotentDelete, RetryConfig, SyncError, SyncResult};
use crate::queue::{Delivery, JobKind, QueueBackend, ReindexJob};
use crate::registry::{EntityRegistry, EntityType};
use crate::runtime_helpers::retry_task;
use crate::store::PrimaryStore;
use crate::utils::{
    DEFAULT_DEQUEUE_WAIT_MS, DEFAULT_MAX_JOB_ATTEMPTS, DEFAULT_REBUILD_LEASE_TTL_SECS,
    DEFAULT_REBUILD_PAGE_SIZE,
};
use crate::versions::VersionManager;

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_job_attempts: u32,
    pub dequeue_wait: Duration,
    pub rebuild_page_size: usize,
    pub rebuild_lease_ttl: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            dequeue_wait: Duration::from_millis(DEFAULT_DEQUEUE_WAIT_MS),
            rebuild_page_size: DEFAULT_REBUILD_PAGE_SIZE,
            rebuild_lease_ttl: Duration::from_secs(DEFAULT_REBUILD_LEASE_TTL_SECS),
        }
    }
}

impl WorkerSettings {
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_job_attempts: config.max_job_attempts(),
            dequeue_wait: config.dequeue_wait(),
            rebuild_page_size: config.rebuild_page_size(),
            rebuild_lease_ttl: config.rebuild_lease_ttl(),
        }
    }
}

/// Documents written by one id-list job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    pub indexed: usize,
    pub deleted: usize,
}

/// Consumes reindex jobs and applies them to the search index
#[derive(Clone)]
pub struct ReindexWorker {
    registry: Arc<EntityRegistry>,
    versions: VersionManager,
    queue: Arc<dyn QueueBackend>,
    store: Arc<dyn PrimaryStore>,
    settings: WorkerSettings,
    retry: RetryConfig,
    // Lease holder identity of this worker
    holder: String,
    stats: Arc<WorkerStats>,
}

impl ReindexWorker {
    #[must_use]
    pub fn new(
        registry: Arc<EntityRegistry>,
        versions: VersionManager,
        queue: Arc<dyn QueueBackend>,
        store: Arc<dyn PrimaryStore>,
    ) -> Self {
        Self {
            registry,
            versions,
            queue,
            store,
            settings: WorkerSettings::default(),
            retry: RetryConfig::default(),
            holder: format!("worker-{}", uuid::Uuid::new_v4()),
            stats: Arc::new(WorkerStats::new()),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// A copy sharing everything but the lease holder identity
    #[must_use]
    pub fn fork(&self) -> Self {
        let mut worker = self.clone();
        worker.holder = format!("worker-{}", uuid::Uuid::new_v4());
        worker
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<WorkerStats> {
        &self.stats
    }

    #[must_use]
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// Operator trigger: queue a full rebuild of `entity_type`
    pub async fn request_rebuild(&self, entity_type: &str) -> SyncResult<()> {
        let entity = self.registry.get(entity_type)?;
        self.queue.enqueue(ReindexJob::rebuild(entity.name())).await?;
        tracing::info!(entity_type = entity.name(), "Rebuild requested");
        Ok(())
    }

    /// Handle at most one delivery; `false` when the queue stayed empty
    pub async fn run_once(&self) -> SyncResult<bool> {
        let Some(delivery) = self.queue.dequeue(self.settings.dequeue_wait).await? else {
            return Ok(false);
        };
        self.handle_delivery(delivery).await?;
        Ok(true)
    }

    /// Process one delivery and ack, nack or drop it
    pub async fn handle_delivery(&self, delivery: Delivery) -> SyncResult<()> {
        let job = &delivery.job;
        tracing::debug!(
            delivery = delivery.id,
            attempt = delivery.attempt,
            kind = ?job.kind(),
            entity_type = job.entity_type(),
            ids = job.ids().len(),
            "Processing reindex job"
        );

        let result = match job.kind() {
            JobKind::Reindex => self.reindex_ids(job.entity_type(), job.ids()).await.map(drop),
            JobKind::Rebuild => self
                .rebuild_delivery(job.entity_type(), Some(delivery.id))
                .await
                .map(drop),
        };

        match result {
            Ok(()) => {
                self.queue.ack(delivery.id).await?;
                WorkerStats::bump(&self.stats.jobs_completed, 1);
            }
            Err(SyncError::RebuildInProgress(entity_type)) if delivery.attempt > 1 => {
                // Possibly this very job, still running under another worker.
                // That worker acks it on success; if it dies the lease expires first.
                let delay = self.settings.rebuild_lease_ttl;
                tracing::info!(
                    %entity_type,
                    delivery = delivery.id,
                    delay_ms = delay.as_millis() as u64,
                    "Rebuild in progress; deferring redelivered rebuild job"
                );
                self.queue.nack(delivery.id, delay).await?;
                WorkerStats::bump(&self.stats.jobs_retried, 1);
            }
            Err(SyncError::RebuildInProgress(entity_type)) => {
                // Another worker is already rebuilding; a second rebuild is rejected, not queued
                tracing::warn!(%entity_type, "Rebuild already in progress; dropping rebuild job");
                self.queue.ack(delivery.id).await?;
                WorkerStats::bump(&self.stats.jobs_dropped, 1);
            }
            Err(e) if is_permanent(&e) || delivery.attempt >= self.settings.max_job_attempts => {
                tracing::error!(
                    delivery = delivery.id,
                    attempt = delivery.attempt,
                    entity_type = job.entity_type(),
                    error = %e,
                    "Dropping reindex job"
                );
                self.queue.ack(delivery.id).await?;
                WorkerStats::bump(&self.stats.jobs_dropped, 1);
            }
            Err(e) => {
                let delay = self.retry.delay_for_attempt(delivery.attempt);
                tracing::warn!(
                    delivery = delivery.id,
                    attempt = delivery.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Reindex job failed; returning it to the queue"
                );
                self.queue.nack(delivery.id, delay).await?;
                WorkerStats::bump(&self.stats.jobs_retried, 1);
            }
        }
        Ok(())
    }

    /// Converge `ids` of `entity_type` with the primary store
    pub async fn reindex_ids(&self, entity_type: &str, ids: &[String]) -> SyncResult<JobReport> {
        let entity = self.registry.get(entity_type)?;
        let client = self.client()?;

        let mut seen = AHashSet::with_capacity(ids.len());
        let mut ops = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let record = retry_task(&self.retry, || self.store.find(entity.name(), id)).await?;
            let op = match record {
                Some(record) if !record.skip_indexing() => BulkOperation::Index(record.to_document()?),
                Some(record) => BulkOperation::Delete {
                    id: id.clone(),
                    routing: record.options.routing,
                },
                None => BulkOperation::Delete {
                    id: id.clone(),
                    routing: None,
                },
            };
            ops.push(op);
        }
        if ops.is_empty() {
            return Ok(JobReport::default());
        }

        // Writes also reach a version being rebuilt so it does not miss them
        let mut targets: SmallVec<[String; 2]> = smallvec![entity.index_name().to_string()];
        if let Some(building) = self.versions.building_version(&entity) {
            targets.push(building);
        }

        let mut report = JobReport::default();
        for (n, target) in targets.iter().enumerate() {
            let applied = self.apply(&client, &entity, target, &ops).await?;
            if n == 0 {
                report = applied;
            }
        }

        WorkerStats::bump(&self.stats.documents_indexed, report.indexed);
        WorkerStats::bump(&self.stats.documents_deleted, report.deleted);
        tracing::debug!(
            entity_type,
            indexed = report.indexed,
            deleted = report.deleted,
            "Applied reindex job"
        );
        Ok(report)
    }

    /// Bulk-apply `ops` to `target`, treating absent documents as deleted
    pub(crate) async fn apply(
        &self,
        client: &Arc<dyn SearchClient>,
        entity: &EntityType,
        target: &str,
        ops: &[BulkOperation],
    ) -> SyncResult<JobReport> {
        let opts = RequestOptions::new(target).doc_type(entity.doc_type());
        let results = match retry_task(&self.retry, || client.bulk(ops.to_vec(), &opts)).await {
            Ok(results) => results,
            Err(e)
                if e.is_not_found()
                    && ops.iter().all(|op| matches!(op, BulkOperation::Delete { .. })) =>
            {
                tracing::debug!(target, "Index absent; nothing to delete");
                return Ok(JobReport::default());
            }
            Err(e) => return Err(e),
        };

        let mut report = JobReport::default();
        let mut first_error = None;
        for (op, result) in ops.iter().zip(results) {
            let outcome = match op {
                BulkOperation::Index(_) => result.map(|()| report.indexed += 1),
                BulkOperation::Delete { .. } => result.absent_ok().map(|_| report.deleted += 1),
            };
            if let Err(e) = outcome {
                tracing::warn!(target, id = op.id(), error = %e, "Bulk item failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    pub(crate) fn client(&self) -> SyncResult<Arc<dyn SearchClient>> {
        self.versions
            .client()
            .cloned()
            .ok_or_else(|| SyncError::BackendUnavailable("no search client configured".to_string()))
    }
}

/// Errors no redelivery can fix
fn is_permanent(error: &SyncError) -> bool {
    matches!(
        error,
        SyncError::UnknownEntityType(_) | SyncError::MissingRequiredInput(_)
    )
}
