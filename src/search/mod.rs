//! Per-entity-type search facade
//!
//! Reads go through the entity type's index name, so they always see the
//! current version: a rebuild in progress stays invisible until promoted.

use std::sync::Arc;
use std::time::Instant;

use crate::client::{SearchClient, SearchHits, SearchOptions, SearchQuery};
use crate::document::Indexable;
use crate::errors::{SyncError, SyncResult};
use crate::registry::{EntityRegistry, EntityType};
use crate::versions::VersionManager;

/// Similarity query anchored on one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoreLikeThis {
    /// Body fields to compare; must not be empty
    pub fields: Vec<String>,
    /// Text to match; defaults to the record's values of `fields`
    pub like_text: Option<String>,
    pub limit: Option<usize>,
}

impl MoreLikeThis {
    #[must_use]
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn like_text(mut self, text: impl Into<String>) -> Self {
        self.like_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Fuzzy similarity takes the same request shape
pub type FuzzyLikeThis = MoreLikeThis;

/// Search, count and maintenance entry points scoped to entity types
#[derive(Clone)]
pub struct EntitySearch {
    registry: Arc<EntityRegistry>,
    versions: VersionManager,
}

impl EntitySearch {
    #[must_use]
    pub fn new(registry: Arc<EntityRegistry>, versions: VersionManager) -> Self {
        Self { registry, versions }
    }

    fn target(&self, entity_type: &str) -> SyncResult<(Arc<EntityType>, Arc<dyn SearchClient>)> {
        let entity = self.registry.get(entity_type)?;
        let client = self
            .versions
            .client()
            .cloned()
            .ok_or_else(|| SyncError::BackendUnavailable("no search client configured".to_string()))?;
        Ok((entity, client))
    }

    fn options(entity: &EntityType, limit: Option<usize>, offset: Option<usize>) -> SearchOptions {
        SearchOptions::new(entity.index_name())
            .doc_type(entity.doc_type())
            .page(
                limit.unwrap_or(SearchOptions::DEFAULT_LIMIT),
                offset.unwrap_or(0),
            )
    }

    /// One page of hits for `query`
    pub async fn search_hits(
        &self,
        entity_type: &str,
        query: &SearchQuery,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> SyncResult<SearchHits> {
        let (entity, client) = self.target(entity_type)?;
        let opts = Self::options(&entity, limit, offset);

        let start = Instant::now();
        let hits = client.search(query, &opts).await?;
        tracing::debug!(
            entity_type,
            query = ?query,
            limit = opts.limit,
            offset = opts.offset,
            total = hits.total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(hits)
    }

    /// Query-string search over every indexed field
    pub async fn search(
        &self,
        entity_type: &str,
        query: &str,
        limit: Option<usize>,
    ) -> SyncResult<SearchHits> {
        let query = if query.trim().is_empty() {
            SearchQuery::MatchAll
        } else {
            SearchQuery::QueryString(query.to_string())
        };
        self.search_hits(entity_type, &query, limit, None).await
    }

    /// Number of documents matching `query`
    pub async fn search_count(&self, entity_type: &str, query: &SearchQuery) -> SyncResult<u64> {
        let (entity, client) = self.target(entity_type)?;
        let opts = Self::options(&entity, Some(0), None);
        client.count(query, &opts).await
    }

    pub async fn refresh_index(&self, entity_type: &str) -> SyncResult<()> {
        let (entity, client) = self.target(entity_type)?;
        client.refresh(entity.index_name()).await?;
        tracing::debug!(entity_type, index = entity.index_name(), "Refreshed index");
        Ok(())
    }

    /// Merge the current version's segments
    pub async fn optimize_index(&self, entity_type: &str) -> SyncResult<()> {
        let (entity, client) = self.target(entity_type)?;
        let start = Instant::now();
        client.optimize(entity.index_name()).await?;
        tracing::info!(
            entity_type,
            index = entity.index_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Optimized index"
        );
        Ok(())
    }

    /// Remove the index name and all of its versions
    pub async fn drop_index(&self, entity_type: &str) -> SyncResult<usize> {
        let entity = self.registry.get(entity_type)?;
        self.versions.drop_index(&entity).await
    }

    /// Documents resembling `record` on the requested fields
    pub async fn more_like_this<E: Indexable + ?Sized>(
        &self,
        entity_type: &str,
        record: &E,
        request: &MoreLikeThis,
    ) -> SyncResult<SearchHits> {
        let (fields, like_text) = like_input("more_like_this", record, request)?;
        let query = SearchQuery::MoreLikeThis { fields, like_text };
        self.search_hits(entity_type, &query, request.limit, None).await
    }

    /// Like `more_like_this`, but each term also matches close misspellings
    pub async fn fuzzy_like_this<E: Indexable + ?Sized>(
        &self,
        entity_type: &str,
        record: &E,
        request: &FuzzyLikeThis,
    ) -> SyncResult<SearchHits> {
        let (fields, like_text) = like_input("fuzzy_like_this", record, request)?;
        let query = SearchQuery::FuzzyLikeThis { fields, like_text };
        self.search_hits(entity_type, &query, request.limit, None).await
    }
}

/// Validated fields and like-text of a similarity request
fn like_input<E: Indexable + ?Sized>(
    operation: &str,
    record: &E,
    request: &MoreLikeThis,
) -> SyncResult<(Vec<String>, String)> {
    if request.fields.is_empty() {
        return Err(SyncError::MissingRequiredInput(format!(
            "{operation} needs at least one field to match against"
        )));
    }

    let like_text = match &request.like_text {
        Some(text) => text.clone(),
        None => like_text_from(&record.document_body()?, &request.fields),
    };
    Ok((request.fields.clone(), like_text))
}

/// Values of `fields` in `body`, joined by spaces
fn like_text_from(body: &serde_json::Value, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|field| body.get(field))
        .map(|value| match value {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
