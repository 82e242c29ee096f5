//! Primary record store interface
//!
//! The worker reads the source of truth through `PrimaryStore`: point
//! lookups for id-list jobs and keyset-ordered scans for full rebuilds.

pub mod memory;

pub use memory::InMemoryStore;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::document::{Indexable, IndexingOptions};
use crate::errors::SyncResult;

/// One record as loaded from the primary store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub body: serde_json::Value,
    #[serde(default)]
    pub options: IndexingOptions,
    /// Keep this record out of the index even though it exists
    #[serde(default)]
    pub skip: bool,
}

impl Record {
    #[must_use]
    pub fn new(id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            body,
            options: IndexingOptions::default(),
            skip: false,
        }
    }

    #[must_use]
    pub fn skipped(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: IndexingOptions) -> Self {
        self.options = options;
        self
    }
}

impl Indexable for Record {
    fn document_id(&self) -> String {
        self.id.clone()
    }

    fn document_body(&self) -> SyncResult<serde_json::Value> {
        Ok(self.body.clone())
    }

    fn indexing_options(&self) -> IndexingOptions {
        self.options.clone()
    }

    fn skip_indexing(&self) -> bool {
        self.skip
    }
}

/// Source of truth for indexed entities
pub trait PrimaryStore: Send + Sync {
    /// Load one record; `None` when it no longer exists
    fn find<'a>(&'a self, entity_type: &'a str, id: &'a str)
    -> BoxFuture<'a, SyncResult<Option<Record>>>;

    /// Up to `limit` records with ids strictly after `after`, in ascending id order
    ///
    /// Ordering must be stable across calls so a rebuild visits every record
    /// exactly once even while other records are inserted or removed.
    fn scan<'a>(
        &'a self,
        entity_type: &'a str,
        after: Option<&'a str>,
        limit: usize,
    ) -> BoxFuture<'a, SyncResult<Vec<Record>>>;
}
