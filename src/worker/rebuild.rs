//! Full-corpus rebuilds
//!
//! A rebuild holds the entity type's lease for its whole run, fills a new
//! `Building` version page by page in keyset order, and promotes it only
//! after the scan completed. Any failure before promotion leaves the current
//! version untouched and abandons the half-built one. Rebuilds never resume:
//! a retry starts over in a brand-new version.
//!
//! When the rebuild came from a queue delivery, that delivery is kept hidden
//! for as long as the lease, so other workers do not pick it up mid-run.

use serde::Serialize;
use std::sync::Arc;

use super::{ReindexWorker, WorkerStats};
use crate::client::{BulkOperation, SearchClient};
use crate::document::Indexable;
use crate::errors::{SyncError, SyncResult};
use crate::queue::{DeliveryId, rebuild_lease_key};
use crate::registry::EntityType;
use crate::runtime_helpers::retry_task;

/// Outcome of a completed rebuild
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub entity_type: String,
    /// Version promoted to current
    pub version: String,
    pub documents: usize,
    /// Superseded versions removed afterwards
    pub pruned: Vec<String>,
}

impl ReindexWorker {
    /// Rebuild the whole index of `entity_type`
    ///
    /// Fails with `RebuildInProgress` while another holder has the lease.
    pub async fn rebuild(&self, entity_type: &str) -> SyncResult<RebuildReport> {
        self.rebuild_delivery(entity_type, None).await
    }

    pub(crate) async fn rebuild_delivery(
        &self,
        entity_type: &str,
        delivery: Option<DeliveryId>,
    ) -> SyncResult<RebuildReport> {
        let entity = self.registry.get(entity_type)?;
        let client = self.client()?;
        let key = rebuild_lease_key(entity.name());
        let ttl = self.settings.rebuild_lease_ttl;

        if !self.queue.try_acquire_lease(&key, &self.holder, ttl).await? {
            return Err(SyncError::RebuildInProgress(entity.name().to_string()));
        }
        tracing::info!(entity_type = entity.name(), holder = %self.holder, "Rebuild started");

        let result = match self.keep_hidden(delivery).await {
            Ok(()) => self.rebuild_locked(&client, &entity, &key, delivery).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.queue.release_lease(&key, &self.holder).await {
            tracing::warn!(lease = %key, error = %e, "Failed to release rebuild lease; it will expire");
        }

        match &result {
            Ok(report) => {
                WorkerStats::bump(&self.stats.rebuilds_completed, 1);
                tracing::info!(
                    entity_type = entity.name(),
                    version = %report.version,
                    documents = report.documents,
                    pruned = report.pruned.len(),
                    "Rebuild completed"
                );
            }
            Err(e) => {
                WorkerStats::bump(&self.stats.rebuilds_failed, 1);
                tracing::error!(entity_type = entity.name(), error = %e, "Rebuild failed");
            }
        }
        result
    }

    async fn rebuild_locked(
        &self,
        client: &Arc<dyn SearchClient>,
        entity: &EntityType,
        key: &str,
        delivery: Option<DeliveryId>,
    ) -> SyncResult<RebuildReport> {
        let version = self.versions.create_building_version(entity).await?.name;

        let filled = match self.fill(client, entity, &version, key, delivery).await {
            Ok(documents) => client.refresh(&version).await.map(|()| documents),
            Err(e) => Err(e),
        };
        let documents = match filled {
            Ok(documents) => documents,
            Err(e) => {
                self.versions.abandon(entity, &version).await;
                return Err(e);
            }
        };

        if let Err(e) = self.versions.promote(entity, &version).await {
            self.versions.abandon(entity, &version).await;
            return Err(e);
        }

        // The new version is live; a failed prune only leaves stale versions behind
        let pruned = match self.versions.prune_versions(entity).await {
            Ok(report) => report.deleted,
            Err(e) => {
                tracing::warn!(entity_type = entity.name(), error = %e, "Prune after rebuild failed");
                Vec::new()
            }
        };

        Ok(RebuildReport {
            entity_type: entity.name().to_string(),
            version,
            documents,
            pruned,
        })
    }

    /// Scan every record into `version`; returns the number indexed
    async fn fill(
        &self,
        client: &Arc<dyn SearchClient>,
        entity: &EntityType,
        version: &str,
        key: &str,
        delivery: Option<DeliveryId>,
    ) -> SyncResult<usize> {
        let page_size = self.settings.rebuild_page_size.max(1);
        let mut after: Option<String> = None;
        let mut documents = 0;

        loop {
            let page = retry_task(&self.retry, || {
                self.store.scan(entity.name(), after.as_deref(), page_size)
            })
            .await?;
            let Some(last) = page.last().map(|record| record.id.clone()) else {
                break;
            };
            let full_page = page.len() == page_size;

            let mut ops = Vec::with_capacity(page.len());
            for record in page.iter().filter(|record| !record.skip_indexing()) {
                ops.push(BulkOperation::Index(record.to_document()?));
            }
            if !ops.is_empty() {
                documents += self.apply(client, entity, version, &ops).await?.indexed;
            }

            if !self
                .queue
                .try_acquire_lease(key, &self.holder, self.settings.rebuild_lease_ttl)
                .await?
            {
                // Lost to another holder; our job must be redelivered, not dropped
                return Err(SyncError::Queue(format!(
                    "rebuild lease of {} expired mid-run",
                    entity.name()
                )));
            }
            self.keep_hidden(delivery).await?;

            tracing::debug!(
                entity_type = entity.name(),
                version,
                documents,
                last_id = %last,
                "Rebuild page written"
            );
            after = Some(last);
            if !full_page {
                break;
            }
        }
        Ok(documents)
    }

    /// Push the delivery's next visibility out to the lease expiry
    async fn keep_hidden(&self, delivery: Option<DeliveryId>) -> SyncResult<()> {
        match delivery {
            Some(id) => self.queue.nack(id, self.settings.rebuild_lease_ttl).await,
            None => Ok(()),
        }
    }
}
