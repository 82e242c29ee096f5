//! In-memory primary store
//!
//! Records are kept per entity type in a `BTreeMap` keyed by id, which gives
//! the keyset order scans need. Useful for embedding and for tests.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::ops::Bound;

use super::{PrimaryStore, Record};
use crate::errors::SyncResult;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: DashMap<String, BTreeMap<String, Record>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn upsert(&self, entity_type: &str, record: Record) {
        log::trace!("Store upsert {entity_type}/{}", record.id);
        self.tables
            .entry(entity_type.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Remove a record; returns it if it existed
    pub fn remove(&self, entity_type: &str, id: &str) -> Option<Record> {
        self.tables
            .get_mut(entity_type)
            .and_then(|mut table| table.remove(id))
    }

    #[must_use]
    pub fn len(&self, entity_type: &str) -> usize {
        self.tables.get(entity_type).map_or(0, |table| table.len())
    }

    #[must_use]
    pub fn is_empty(&self, entity_type: &str) -> bool {
        self.len(entity_type) == 0
    }
}

impl PrimaryStore for InMemoryStore {
    fn find<'a>(
        &'a self,
        entity_type: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, SyncResult<Option<Record>>> {
        Box::pin(async move {
            Ok(self
                .tables
                .get(entity_type)
                .and_then(|table| table.get(id).cloned()))
        })
    }

    fn scan<'a>(
        &'a self,
        entity_type: &'a str,
        after: Option<&'a str>,
        limit: usize,
    ) -> BoxFuture<'a, SyncResult<Vec<Record>>> {
        Box::pin(async move {
            let Some(table) = self.tables.get(entity_type) else {
                return Ok(Vec::new());
            };
            let lower = match after {
                Some(id) => Bound::Excluded(id.to_string()),
                None => Bound::Unbounded,
            };
            Ok(table
                .range((lower, Bound::Unbounded))
                .take(limit)
                .map(|(_, record)| record.clone())
                .collect())
        })
    }
}
