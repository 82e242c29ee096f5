//! Error types for index synchronization
//!
//! This module defines the error taxonomy shared by the search client, the
//! update dispatcher, the version manager and the reindex worker, together
//! with retry configuration for transient failures.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Why the search backend refused an operation it was able to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// The addressed document does not exist
    DocumentMissing,
    /// The addressed index, alias or version does not exist
    IndexMissing,
    /// The version is referenced by a current pointer and cannot be removed
    VersionInUse,
    /// The document body conflicts with the version's mapping
    MappingConflict,
    /// The request itself is malformed (bad name, bad query, ...)
    InvalidRequest,
    /// Anything else the backend refused
    Other,
}

impl RejectionKind {
    /// NotFound-class rejections are success for delete-class operations
    #[inline]
    #[must_use]
    pub fn is_not_found(self) -> bool {
        matches!(self, RejectionKind::DocumentMissing | RejectionKind::IndexMissing)
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectionKind::DocumentMissing => "document_missing",
            RejectionKind::IndexMissing => "index_missing",
            RejectionKind::VersionInUse => "version_in_use",
            RejectionKind::MappingConflict => "mapping_conflict",
            RejectionKind::InvalidRequest => "invalid_request",
            RejectionKind::Other => "rejected",
        };
        f.write_str(label)
    }
}

/// Error types for index synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// Search backend unreachable
    #[error("Search backend connection failed: {0}")]
    ConnectionFailed(String),

    /// Search backend reached but refused the operation
    #[error("Search backend rejected operation ({kind}): {reason}")]
    RemoteRejected { kind: RejectionKind, reason: String },

    /// No search client could be constructed at startup
    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Unsupported update policy value
    #[error("'{value}' is not a valid index policy; must be one of {allowed}")]
    InvalidPolicy { value: String, allowed: String },

    /// A request was issued without an input it cannot default
    #[error("Missing required input: {0}")]
    MissingRequiredInput(String),

    /// A rebuild for the same entity type is already running
    #[error("A rebuild of '{0}' is already in progress")]
    RebuildInProgress(String),

    /// Entity type was never registered
    #[error("Entity type '{0}' is not registered")]
    UnknownEntityType(String),

    /// Entity type registered twice
    #[error("Entity type '{0}' is already registered")]
    DuplicateEntityType(String),

    /// Primary store lookup or scan failed
    #[error("Primary store error: {0}")]
    Store(String),

    /// Queue backend failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Document or payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for SyncError {
    fn from(error: anyhow::Error) -> Self {
        SyncError::Other(error.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Queue(error.to_string())
    }
}

impl SyncError {
    /// Shorthand for a remote rejection
    #[must_use]
    pub fn rejected(kind: RejectionKind, reason: impl Into<String>) -> Self {
        SyncError::RemoteRejected {
            kind,
            reason: reason.into(),
        }
    }

    /// Check if the error is a NotFound-class remote rejection
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::RemoteRejected { kind, .. } if kind.is_not_found())
    }

    /// Check if error is transient and should be retried
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_) | SyncError::Store(_) | SyncError::Queue(_)
        )
    }

    /// Get suggested retry delay for transient errors
    #[must_use]
    pub fn retry_delay(&self) -> Option<Duration> {
        if self.is_transient() {
            Some(Duration::from_millis(100))
        } else {
            None
        }
    }
}

/// Treat NotFound-class rejections as success for delete-class operations
///
/// Every delete path (dispatcher, worker, version pruning, index drop) goes
/// through this one combinator so a document or index that is already gone
/// never surfaces as an error.
pub trait IdempotentDelete {
    /// Map a NotFound-class rejection to `Ok(false)`; `Ok(true)` means something was deleted
    fn absent_ok(self) -> SyncResult<bool>;
}

impl IdempotentDelete for SyncResult<()> {
    #[inline]
    fn absent_ok(self) -> SyncResult<bool> {
        match self {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Retry configuration for backend operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial retry delay
    pub initial_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum retry delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for given attempt number (0-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_ok_swallows_not_found_class_only() {
        let missing_doc: SyncResult<()> =
            Err(SyncError::rejected(RejectionKind::DocumentMissing, "42"));
        assert!(!missing_doc.absent_ok().expect("missing doc is fine"));

        let missing_index: SyncResult<()> =
            Err(SyncError::rejected(RejectionKind::IndexMissing, "articles"));
        assert!(!missing_index.absent_ok().expect("missing index is fine"));

        let conflict: SyncResult<()> =
            Err(SyncError::rejected(RejectionKind::MappingConflict, "title"));
        assert!(conflict.absent_ok().is_err());

        let down: SyncResult<()> = Err(SyncError::ConnectionFailed("refused".into()));
        assert!(down.absent_ok().is_err());

        assert!(Ok::<(), SyncError>(()).absent_ok().expect("deleted"));
    }

    #[test]
    fn transient_classification() {
        assert!(SyncError::ConnectionFailed("x".into()).is_transient());
        assert!(SyncError::Store("x".into()).is_transient());
        assert!(!SyncError::RebuildInProgress("article".into()).is_transient());
        assert!(
            !SyncError::rejected(RejectionKind::Other, "nope").is_transient()
        );
        assert!(SyncError::Queue("busy".into()).retry_delay().is_some());
    }
}
