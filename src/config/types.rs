//! Core configuration type for index synchronization
//!
//! `SyncConfig` carries the storage locations and the tuning knobs of the
//! backend, the queue and the workers, plus the entity type registrations
//! read from the config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::registry::EntityTypeDefinition;
use crate::utils::{
    DEFAULT_DEQUEUE_WAIT_MS, DEFAULT_MAX_JOB_ATTEMPTS, DEFAULT_REBUILD_LEASE_TTL_SECS,
    DEFAULT_REBUILD_PAGE_SIZE, DEFAULT_VISIBILITY_TIMEOUT_SECS, MIN_WRITER_MEMORY_LIMIT,
};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the embedded backend and default queue location.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in builder and loader).
    pub(crate) storage_dir: PathBuf,

    /// SQLite queue file; defaults to `{storage_dir}/queue.sqlite3`
    pub(crate) queue_path: Option<PathBuf>,

    /// Tantivy writer memory budget in bytes, per index version
    pub(crate) writer_memory_limit: Option<usize>,

    /// Number of worker loops; defaults to the CPU count
    pub(crate) worker_concurrency: Option<usize>,

    pub(crate) dequeue_wait_ms: u64,

    /// Seconds before an unacknowledged delivery is handed out again
    pub(crate) visibility_timeout_secs: u64,

    /// Deliveries of one job before it is dropped
    pub(crate) max_job_attempts: u32,

    pub(crate) rebuild_page_size: usize,
    pub(crate) rebuild_lease_ttl_secs: u64,

    /// Refresh the whole index after an immediate write instead of asking
    /// for a document-level refresh on the write itself
    ///
    /// Default: true
    pub(crate) coarse_refresh: bool,

    /// Entity types to register at startup
    pub(crate) entities: Vec<EntityTypeDefinition>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./indexsync"),
            queue_path: None,
            writer_memory_limit: None,
            worker_concurrency: None,
            dequeue_wait_ms: DEFAULT_DEQUEUE_WAIT_MS,
            visibility_timeout_secs: DEFAULT_VISIBILITY_TIMEOUT_SECS,
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            rebuild_page_size: DEFAULT_REBUILD_PAGE_SIZE,
            rebuild_lease_ttl_secs: DEFAULT_REBUILD_LEASE_TTL_SECS,
            coarse_refresh: true,
            entities: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Load a JSON config file
    ///
    /// Relative `storage_dir` and `queue_path` values are resolved against the
    /// directory containing the file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let base = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.storage_dir = absolute_from(&base, &config.storage_dir)?;
        if let Some(queue_path) = config.queue_path.take() {
            config.queue_path = Some(absolute_from(&base, &queue_path)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if let Some(limit) = self.writer_memory_limit
            && limit < MIN_WRITER_MEMORY_LIMIT
        {
            anyhow::bail!(
                "writer_memory_limit must be at least {MIN_WRITER_MEMORY_LIMIT} bytes, got {limit}"
            );
        }
        if self.worker_concurrency == Some(0) {
            anyhow::bail!("worker_concurrency must be at least 1");
        }
        if self.max_job_attempts == 0 {
            anyhow::bail!("max_job_attempts must be at least 1");
        }
        if self.rebuild_page_size == 0 {
            anyhow::bail!("rebuild_page_size must be at least 1");
        }
        Ok(())
    }
}

/// Resolve `path` against `base` and make the result absolute
pub(crate) fn absolute_from(base: &Path, path: &Path) -> anyhow::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    Ok(std::path::absolute(&joined)?)
}
