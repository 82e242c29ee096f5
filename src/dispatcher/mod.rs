//! Update policy dispatch
//!
//! Host code calls `on_save` / `on_delete` after a record mutation commits.
//! The entity type's current policy decides whether the index is written
//! synchronously, written and refreshed, left alone, or updated through the
//! reindex queue. Synchronous writes are mirrored into a version that a
//! rebuild in this process is filling, so the promoted version keeps them.

use std::sync::Arc;

use crate::client::{RequestOptions, SearchClient};
use crate::document::{Document, Indexable};
use crate::errors::{IdempotentDelete, SyncError, SyncResult};
use crate::queue::{QueueBackend, ReindexJob};
use crate::registry::{EntityRegistry, EntityType, UpdatePolicy};
use crate::versions::VersionManager;

/// What a save or delete hook ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Policy disabled, record skipped, or no backend available
    Skipped,
    /// Written to the index on the caller's task
    Written,
    /// Document was already absent from the index
    AlreadyAbsent,
    /// Pushed to the reindex queue
    Enqueued,
    /// Backend unreachable; the write was dropped with a warning
    Unreachable,
}

/// Routes entity mutations according to each entity type's update policy
#[derive(Clone)]
pub struct UpdateDispatcher {
    registry: Arc<EntityRegistry>,
    versions: VersionManager,
    queue: Arc<dyn QueueBackend>,
    coarse_refresh: bool,
}

impl UpdateDispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<EntityRegistry>,
        versions: VersionManager,
        queue: Arc<dyn QueueBackend>,
    ) -> Self {
        Self {
            registry,
            versions,
            queue,
            coarse_refresh: true,
        }
    }

    /// Refresh the whole index after a write (default) or ask for a
    /// document-level refresh on the write itself
    #[must_use]
    pub fn with_coarse_refresh(mut self, coarse: bool) -> Self {
        self.coarse_refresh = coarse;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Validated policy change; a bad value leaves the old policy in place
    pub fn set_policy(&self, entity_type: &str, raw: &str) -> SyncResult<UpdatePolicy> {
        self.registry.set_policy(entity_type, raw)
    }

    /// Hook for a committed create or update
    pub async fn on_save<E: Indexable + ?Sized>(
        &self,
        entity_type: &str,
        record: &E,
    ) -> SyncResult<DispatchOutcome> {
        let entity = self.registry.get(entity_type)?;
        if record.skip_indexing() {
            tracing::trace!(entity_type, id = %record.document_id(), "Record opted out of indexing");
            return Ok(DispatchOutcome::Skipped);
        }

        match entity.update_policy() {
            UpdatePolicy::Disabled => Ok(DispatchOutcome::Skipped),
            UpdatePolicy::Enqueue => self.enqueue(&entity, record.document_id()).await,
            policy @ (UpdatePolicy::Immediate | UpdatePolicy::ImmediateWithRefresh) => {
                let Some(client) = self.versions.client() else {
                    tracing::debug!(entity_type, "No search client; skipping index write");
                    return Ok(DispatchOutcome::Skipped);
                };
                let doc = record.to_document()?;
                let refresh = policy == UpdatePolicy::ImmediateWithRefresh;
                let opts = self.write_options(&entity, refresh);

                let result = match client.index(&doc, &opts).await {
                    Ok(()) => self.after_write(client, &entity, refresh).await,
                    Err(e) => Err(e),
                };
                let result = match result {
                    Ok(()) => self.index_building(client, &entity, &doc).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => Ok(DispatchOutcome::Written),
                    Err(e) => unreachable_or(e, &entity, &doc.id),
                }
            }
        }
    }

    /// Hook for a committed delete
    pub async fn on_delete<E: Indexable + ?Sized>(
        &self,
        entity_type: &str,
        record: &E,
    ) -> SyncResult<DispatchOutcome> {
        self.delete_by_id(entity_type, &record.document_id()).await
    }

    /// Delete hook when only the id is left
    pub async fn delete_by_id(&self, entity_type: &str, id: &str) -> SyncResult<DispatchOutcome> {
        let entity = self.registry.get(entity_type)?;

        match entity.update_policy() {
            UpdatePolicy::Disabled => Ok(DispatchOutcome::Skipped),
            UpdatePolicy::Enqueue => self.enqueue(&entity, id.to_string()).await,
            policy @ (UpdatePolicy::Immediate | UpdatePolicy::ImmediateWithRefresh) => {
                let Some(client) = self.versions.client() else {
                    tracing::debug!(entity_type, "No search client; skipping index delete");
                    return Ok(DispatchOutcome::Skipped);
                };
                let refresh = policy == UpdatePolicy::ImmediateWithRefresh;
                let opts = self.write_options(&entity, refresh);

                let deleted = match client.delete(id, &opts).await.absent_ok() {
                    Ok(deleted) => deleted,
                    Err(e) => return unreachable_or(e, &entity, id),
                };
                if let Err(e) = self.after_write(client, &entity, refresh).await {
                    return unreachable_or(e, &entity, id);
                }
                if let Err(e) = self.delete_building(client, &entity, id).await {
                    return unreachable_or(e, &entity, id);
                }

                if deleted {
                    Ok(DispatchOutcome::Written)
                } else {
                    tracing::debug!(entity_type, id, "Document already absent from index");
                    Ok(DispatchOutcome::AlreadyAbsent)
                }
            }
        }
    }

    fn write_options(&self, entity: &EntityType, refresh: bool) -> RequestOptions {
        RequestOptions::new(entity.index_name())
            .doc_type(entity.doc_type())
            .refresh(refresh && !self.coarse_refresh)
    }

    async fn after_write(
        &self,
        client: &Arc<dyn SearchClient>,
        entity: &EntityType,
        refresh: bool,
    ) -> SyncResult<()> {
        if !(refresh && self.coarse_refresh) {
            return Ok(());
        }
        // A refresh of an index that is already gone is not a failure of the write
        match client.refresh(entity.index_name()).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Mirror a write into the version a rebuild is filling, if any
    async fn index_building(
        &self,
        client: &Arc<dyn SearchClient>,
        entity: &EntityType,
        doc: &Document,
    ) -> SyncResult<()> {
        let Some(building) = self.versions.building_version(entity) else {
            return Ok(());
        };
        let opts = RequestOptions::new(building.as_str()).doc_type(entity.doc_type());
        match client.index(doc, &opts).await {
            // Abandoned since we looked it up
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn delete_building(
        &self,
        client: &Arc<dyn SearchClient>,
        entity: &EntityType,
        id: &str,
    ) -> SyncResult<()> {
        let Some(building) = self.versions.building_version(entity) else {
            return Ok(());
        };
        let opts = RequestOptions::new(building.as_str()).doc_type(entity.doc_type());
        client.delete(id, &opts).await.absent_ok().map(drop)
    }

    async fn enqueue(&self, entity: &EntityType, id: String) -> SyncResult<DispatchOutcome> {
        let job = ReindexJob::reindex(entity.name(), vec![id]);
        self.queue.enqueue(job).await?;
        Ok(DispatchOutcome::Enqueued)
    }
}

/// Backend unreachability never fails the host's save; everything else surfaces
fn unreachable_or(error: SyncError, entity: &EntityType, id: &str) -> SyncResult<DispatchOutcome> {
    match error {
        SyncError::ConnectionFailed(reason) => {
            tracing::warn!(
                entity_type = entity.name(),
                id,
                reason = %reason,
                "Search backend unreachable; index not updated"
            );
            Ok(DispatchOutcome::Unreachable)
        }
        other => Err(other),
    }
}
