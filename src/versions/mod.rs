//! Index version lifecycle
//!
//! Each entity type's index name points at one physical version. A rebuild
//! writes into a fresh `Building` version and swaps the pointer only once the
//! version is complete; superseded versions are pruned afterwards.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::client::{RequestOptions, SearchBackend, SearchClient, VersionInfo};
use crate::errors::{IdempotentDelete, RejectionKind, SyncError, SyncResult};
use crate::registry::EntityType;

/// Lifecycle state of a physical index version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Being filled by a rebuild in this process; not yet searchable by name
    Building,
    /// Designated by the index name's current pointer
    Current,
    /// Superseded; eligible for pruning
    Stale,
}

/// A physical index version of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexVersion {
    pub name: String,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Versions removed (or already gone)
    pub deleted: Vec<String>,
    /// Versions left in place because they are current or still building
    pub kept: Vec<String>,
}

/// Creates, lists, promotes and prunes index versions
///
/// Cheap to clone; clones share the set of versions being built.
#[derive(Clone)]
pub struct VersionManager {
    client: SearchBackend,
    // entity type name -> version being built for it
    building: Arc<DashMap<String, String>>,
}

impl VersionManager {
    #[must_use]
    pub fn new(client: SearchBackend) -> Self {
        Self {
            client,
            building: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn client(&self) -> Option<&Arc<dyn SearchClient>> {
        self.client.as_ref()
    }

    fn require_client(&self) -> SyncResult<&Arc<dyn SearchClient>> {
        self.client
            .as_ref()
            .ok_or_else(|| SyncError::BackendUnavailable("no search client configured".to_string()))
    }

    /// Create a new version, apply the mapping and make it current
    pub async fn create_version(&self, entity: &EntityType) -> SyncResult<IndexVersion> {
        let mut version = self.create_building_version(entity).await?;
        self.promote(entity, &version.name).await?;
        version.status = VersionStatus::Current;
        Ok(version)
    }

    /// Create a new version with the entity's mapping, left in `Building`
    pub async fn create_building_version(&self, entity: &EntityType) -> SyncResult<IndexVersion> {
        let client = self.require_client()?;
        let VersionInfo { name, created_at } = client
            .create_index_version(entity.index_name(), entity.index_options())
            .await?;

        if let Some(mapping) = entity.mapping().filter(|mapping| !mapping.is_empty()) {
            let opts = RequestOptions::new(name.as_str()).doc_type(entity.doc_type());
            if let Err(e) = client.update_mapping(mapping, &opts).await {
                if let Err(cleanup) = client.delete_index_version(&name).await.absent_ok() {
                    tracing::warn!(version = %name, error = %cleanup, "Failed to remove version after mapping error");
                }
                return Err(e);
            }
        }

        self.building
            .insert(entity.name().to_string(), name.clone());
        tracing::info!(
            entity_type = entity.name(),
            version = %name,
            "Created building index version"
        );

        Ok(IndexVersion {
            name,
            status: VersionStatus::Building,
            created_at,
        })
    }

    /// Atomically point the entity's index name at `version`
    pub async fn promote(&self, entity: &EntityType, version: &str) -> SyncResult<()> {
        let client = self.require_client()?;
        client
            .deploy_index_version(entity.index_name(), version)
            .await?;
        self.building
            .remove_if(entity.name(), |_, building| building == version);
        tracing::info!(
            entity_type = entity.name(),
            index = entity.index_name(),
            version,
            "Promoted index version to current"
        );
        Ok(())
    }

    /// Forget a building version and delete it, best effort
    pub async fn abandon(&self, entity: &EntityType, version: &str) {
        self.building
            .remove_if(entity.name(), |_, building| building == version);
        let Some(client) = self.client.as_ref() else {
            return;
        };
        match client.delete_index_version(version).await.absent_ok() {
            Ok(_) => tracing::info!(entity_type = entity.name(), version, "Abandoned building version"),
            Err(e) => tracing::warn!(
                entity_type = entity.name(),
                version,
                error = %e,
                "Could not delete abandoned version; the next prune will retry"
            ),
        }
    }

    /// The version a rebuild of `entity` is filling in this process, if any
    #[must_use]
    pub fn building_version(&self, entity: &EntityType) -> Option<String> {
        self.building
            .get(entity.name())
            .map(|entry| entry.value().clone())
    }

    /// Versions of the entity's index, newest first
    pub async fn list_versions(&self, entity: &EntityType) -> SyncResult<Vec<IndexVersion>> {
        let Some(client) = self.client.as_ref() else {
            return Ok(Vec::new());
        };

        let current = self.current_version(entity).await?;
        let building = self.building_version(entity);
        let versions = client.list_index_versions(entity.index_name()).await?;

        Ok(versions
            .into_iter()
            .map(|info| {
                let status = if current.as_deref() == Some(info.name.as_str()) {
                    VersionStatus::Current
                } else if building.as_deref() == Some(info.name.as_str()) {
                    VersionStatus::Building
                } else {
                    VersionStatus::Stale
                };
                IndexVersion {
                    name: info.name,
                    status,
                    created_at: info.created_at,
                }
            })
            .collect())
    }

    /// The current version; an unresolvable index is `None`
    pub async fn current_version(&self, entity: &EntityType) -> SyncResult<Option<String>> {
        let Some(client) = self.client.as_ref() else {
            return Ok(None);
        };
        match client.current_index_version(entity.index_name()).await {
            Ok(version) => Ok(version),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create and promote a first version if the entity has no current one
    pub async fn ensure_current(&self, entity: &EntityType) -> SyncResult<String> {
        self.require_client()?;
        if let Some(current) = self.current_version(entity).await? {
            return Ok(current);
        }
        Ok(self.create_version(entity).await?.name)
    }

    /// Delete every version that is neither current nor building
    pub async fn prune_versions(&self, entity: &EntityType) -> SyncResult<PruneReport> {
        let Some(client) = self.client.as_ref() else {
            tracing::debug!(entity_type = entity.name(), "No search client; nothing to prune");
            return Ok(PruneReport::default());
        };

        let mut report = PruneReport::default();
        for version in self.list_versions(entity).await? {
            if version.status != VersionStatus::Stale {
                report.kept.push(version.name);
                continue;
            }

            match client.delete_index_version(&version.name).await.absent_ok() {
                Ok(_) => report.deleted.push(version.name),
                Err(SyncError::RemoteRejected {
                    kind: RejectionKind::VersionInUse,
                    ..
                }) => {
                    // Promoted between listing and deletion
                    tracing::debug!(version = %version.name, "Version became current; keeping it");
                    report.kept.push(version.name);
                }
                Err(e) => return Err(e),
            }
        }

        if !report.deleted.is_empty() {
            tracing::info!(
                entity_type = entity.name(),
                deleted = report.deleted.len(),
                kept = report.kept.len(),
                "Pruned index versions"
            );
        }
        Ok(report)
    }

    /// Delete the index name and every version behind it
    ///
    /// Returns the number of versions removed. A missing index is not an error.
    pub async fn drop_index(&self, entity: &EntityType) -> SyncResult<usize> {
        let client = self.require_client()?;

        client.delete_index(entity.index_name()).await.absent_ok()?;

        let mut deleted = 0;
        for version in client.list_index_versions(entity.index_name()).await? {
            if client
                .delete_index_version(&version.name)
                .await
                .absent_ok()?
            {
                deleted += 1;
            }
        }
        self.building.remove(entity.name());

        tracing::info!(
            entity_type = entity.name(),
            index = entity.index_name(),
            versions = deleted,
            "Dropped index"
        );
        Ok(deleted)
    }
}
