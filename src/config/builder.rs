//! Type-safe builder for `SyncConfig` using the typestate pattern
//!
//! `build()` only exists once the storage directory is set.

use anyhow::{Result, anyhow};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::{SyncConfig, absolute_from};
use crate::registry::EntityTypeDefinition;

// Type states for the builder
pub struct WithStorageDir;

pub struct SyncConfigBuilder<State = ()> {
    pub(crate) storage_dir: Option<PathBuf>,
    pub(crate) settings: SyncConfig,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for SyncConfigBuilder<()> {
    fn default() -> Self {
        Self {
            storage_dir: None,
            settings: SyncConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl SyncConfig {
    /// Create a builder for configuring a `SyncConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> SyncConfigBuilder<()> {
        SyncConfigBuilder::default()
    }
}

impl SyncConfigBuilder<()> {
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> SyncConfigBuilder<WithStorageDir> {
        SyncConfigBuilder {
            storage_dir: Some(dir.into()),
            settings: self.settings,
            _phantom: PhantomData,
        }
    }
}

// Build method only available when the storage directory is set
impl SyncConfigBuilder<WithStorageDir> {
    pub fn build(self) -> Result<SyncConfig> {
        let storage_dir = self
            .storage_dir
            .ok_or_else(|| anyhow!("storage_dir is required"))?;
        let cwd = std::env::current_dir()?;

        let mut config = self.settings;
        config.storage_dir = absolute_from(&cwd, &storage_dir)?;
        if let Some(queue_path) = config.queue_path.take() {
            config.queue_path = Some(absolute_from(&cwd, &queue_path)?);
        }

        config.validate()?;
        Ok(config)
    }
}

// Optional knobs, available at any state
impl<State> SyncConfigBuilder<State> {
    #[must_use]
    pub fn queue_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.queue_path = Some(path.into());
        self
    }

    /// Tantivy writer memory budget in bytes (at least 15MB)
    #[must_use]
    pub fn writer_memory_limit(mut self, bytes: usize) -> Self {
        self.settings.writer_memory_limit = Some(bytes);
        self
    }

    #[must_use]
    pub fn worker_concurrency(mut self, workers: usize) -> Self {
        self.settings.worker_concurrency = Some(workers);
        self
    }

    #[must_use]
    pub fn dequeue_wait_ms(mut self, millis: u64) -> Self {
        self.settings.dequeue_wait_ms = millis;
        self
    }

    #[must_use]
    pub fn visibility_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.visibility_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_job_attempts(mut self, attempts: u32) -> Self {
        self.settings.max_job_attempts = attempts;
        self
    }

    #[must_use]
    pub fn rebuild_page_size(mut self, size: usize) -> Self {
        self.settings.rebuild_page_size = size;
        self
    }

    #[must_use]
    pub fn rebuild_lease_ttl_secs(mut self, secs: u64) -> Self {
        self.settings.rebuild_lease_ttl_secs = secs;
        self
    }

    /// Choose between whole-index refresh (default) and per-write refresh
    ///
    /// # Example
    /// ```rust
    /// # use kodegen_tools_indexsync::config::SyncConfig;
    /// # fn main() -> anyhow::Result<()> {
    /// let config = SyncConfig::builder()
    ///     .storage_dir("./indexsync")
    ///     .coarse_refresh(false)
    ///     .build()?;
    /// assert!(!config.coarse_refresh());
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn coarse_refresh(mut self, coarse: bool) -> Self {
        self.settings.coarse_refresh = coarse;
        self
    }

    #[must_use]
    pub fn entity(mut self, definition: EntityTypeDefinition) -> Self {
        self.settings.entities.push(definition);
        self
    }
}
