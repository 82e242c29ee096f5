pub mod client;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod errors;
pub mod queue;
pub mod registry;
pub mod runtime_helpers;
pub mod search;
pub mod store;
pub mod utils;
pub mod versions;
pub mod worker;

pub use client::{
    BulkOperation, RequestOptions, SearchBackend, SearchClient, SearchHit, SearchHits,
    SearchOptions, SearchQuery, TantivyClient, VersionInfo, connect_backend,
};
pub use config::SyncConfig;
pub use dispatcher::{DispatchOutcome, UpdateDispatcher};
pub use document::{Document, Indexable, IndexingOptions, serialize_body};
pub use errors::{IdempotentDelete, RejectionKind, RetryConfig, SyncError, SyncResult};
pub use queue::{Delivery, JobKind, MemoryQueue, QueueBackend, ReindexJob, SqliteQueue};
pub use registry::{
    EntityRegistry, EntityType, EntityTypeDefinition, FieldKind, FieldMapping, IndexOptions,
    Mapping, UpdatePolicy,
};
pub use runtime_helpers::retry_task;
pub use search::{EntitySearch, FuzzyLikeThis, MoreLikeThis};
pub use store::{InMemoryStore, PrimaryStore, Record};
pub use versions::{IndexVersion, PruneReport, VersionManager, VersionStatus};
pub use worker::{
    JobReport, RebuildReport, ReindexService, ReindexWorker, WorkerSettings, WorkerStats,
    WorkerStatsSnapshot,
};

use std::sync::Arc;

/// Everything a host process needs, wired from one configuration
///
/// The search client is optional: when the backend cannot be opened the
/// dispatcher and version manager degrade to "index unavailable".
#[derive(Clone)]
pub struct IndexSync {
    pub registry: Arc<EntityRegistry>,
    pub versions: VersionManager,
    pub dispatcher: UpdateDispatcher,
    pub search: EntitySearch,
    pub queue: Arc<dyn QueueBackend>,
}

impl IndexSync {
    /// Open the backend and the durable queue described by `config`
    pub async fn open(config: &SyncConfig) -> SyncResult<Self> {
        let queue = SqliteQueue::open(&config.queue_path(), config.visibility_timeout()).await?;
        let client = connect_backend(config).await;
        Self::assemble(config, client, Arc::new(queue))
    }

    /// Wire components around an existing client and queue
    pub fn assemble(
        config: &SyncConfig,
        client: SearchBackend,
        queue: Arc<dyn QueueBackend>,
    ) -> SyncResult<Self> {
        let registry = Arc::new(config.registry()?);
        let versions = VersionManager::new(client);
        let dispatcher =
            UpdateDispatcher::new(Arc::clone(&registry), versions.clone(), Arc::clone(&queue))
                .with_coarse_refresh(config.coarse_refresh());
        let search = EntitySearch::new(Arc::clone(&registry), versions.clone());
        Ok(Self {
            registry,
            versions,
            dispatcher,
            search,
            queue,
        })
    }

    /// A worker over `store` sharing this instance's version manager
    #[must_use]
    pub fn worker(&self, config: &SyncConfig, store: Arc<dyn PrimaryStore>) -> ReindexWorker {
        ReindexWorker::new(
            Arc::clone(&self.registry),
            self.versions.clone(),
            Arc::clone(&self.queue),
            store,
        )
        .with_settings(WorkerSettings::from_config(config))
    }

    /// Give every registered entity type a current version
    pub async fn ensure_indices(&self) -> SyncResult<()> {
        if self.versions.client().is_none() {
            return Ok(());
        }
        for entity in self.registry.entity_types() {
            let version = self.versions.ensure_current(&entity).await?;
            tracing::debug!(entity_type = entity.name(), version = %version, "Index ready");
        }
        Ok(())
    }
}
