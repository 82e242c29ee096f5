//! Reindex job payload
//!
//! Wire format (JSON):
//!
//! ```json
//! {"jobKind": "reindex", "entityType": "Article", "ids": ["42"], "enqueuedAt": "2010-10-25T12:00:00Z"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SyncError, SyncResult};

/// What a job asks the worker to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Converge the listed ids with the primary store
    Reindex,
    /// Rebuild the whole index of the entity type
    Rebuild,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobWire {
    job_kind: JobKind,
    entity_type: String,
    #[serde(default)]
    ids: Vec<String>,
    enqueued_at: DateTime<Utc>,
}

/// An immutable unit of queued work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobWire", into = "JobWire")]
pub struct ReindexJob {
    kind: JobKind,
    entity_type: String,
    ids: Vec<String>,
    enqueued_at: DateTime<Utc>,
}

impl ReindexJob {
    /// A job converging `ids` of `entity_type`
    #[must_use]
    pub fn reindex(entity_type: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            kind: JobKind::Reindex,
            entity_type: entity_type.into(),
            ids,
            enqueued_at: Utc::now(),
        }
    }

    /// A full-rebuild marker for `entity_type`
    #[must_use]
    pub fn rebuild(entity_type: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Rebuild,
            entity_type: entity_type.into(),
            ids: Vec::new(),
            enqueued_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl TryFrom<JobWire> for ReindexJob {
    type Error = SyncError;

    fn try_from(wire: JobWire) -> Result<Self, Self::Error> {
        if wire.entity_type.is_empty() {
            return Err(SyncError::MissingRequiredInput(
                "job entityType must not be empty".to_string(),
            ));
        }
        if wire.job_kind == JobKind::Rebuild && !wire.ids.is_empty() {
            return Err(SyncError::Queue(
                "rebuild jobs do not carry ids".to_string(),
            ));
        }
        Ok(Self {
            kind: wire.job_kind,
            entity_type: wire.entity_type,
            ids: wire.ids,
            enqueued_at: wire.enqueued_at,
        })
    }
}

impl From<ReindexJob> for JobWire {
    fn from(job: ReindexJob) -> Self {
        Self {
            job_kind: job.kind,
            entity_type: job.entity_type,
            ids: job.ids,
            enqueued_at: job.enqueued_at,
        }
    }
}
