//! Getter methods for `SyncConfig`
//!
//! Optional knobs resolve to their defaults here, so callers never see an
//! unset value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::SyncConfig;
use crate::errors::SyncResult;
use crate::registry::{EntityRegistry, EntityTypeDefinition};
use crate::utils::{DEFAULT_WRITER_MEMORY_LIMIT, INDEX_DIR_NAME, QUEUE_FILE_NAME};

impl SyncConfig {
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Root directory of the embedded search backend
    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.storage_dir.join(INDEX_DIR_NAME)
    }

    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.queue_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join(QUEUE_FILE_NAME))
    }

    #[must_use]
    pub fn writer_memory_limit(&self) -> usize {
        self.writer_memory_limit
            .unwrap_or(DEFAULT_WRITER_MEMORY_LIMIT)
    }

    #[must_use]
    pub fn worker_concurrency(&self) -> usize {
        self.worker_concurrency
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }

    #[must_use]
    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }

    #[must_use]
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    #[must_use]
    pub fn max_job_attempts(&self) -> u32 {
        self.max_job_attempts
    }

    #[must_use]
    pub fn rebuild_page_size(&self) -> usize {
        self.rebuild_page_size
    }

    #[must_use]
    pub fn rebuild_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.rebuild_lease_ttl_secs)
    }

    #[must_use]
    pub fn coarse_refresh(&self) -> bool {
        self.coarse_refresh
    }

    #[must_use]
    pub fn entities(&self) -> &[EntityTypeDefinition] {
        &self.entities
    }

    /// Build the entity registry from the configured definitions
    pub fn registry(&self) -> SyncResult<EntityRegistry> {
        EntityRegistry::from_definitions(self.entities.iter().cloned())
    }
}
