//! Request and response types for `SearchClient`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Options for single-document writes and mapping updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Index name (resolved through its current pointer) or concrete version
    pub index: String,
    /// Document type / namespace inside the index
    pub doc_type: Option<String>,
    /// Ask the backend to make this write visible before returning
    pub refresh: bool,
    pub routing: Option<String>,
}

impl RequestOptions {
    #[must_use]
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    #[must_use]
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    #[must_use]
    pub fn routing(mut self, routing: Option<String>) -> Self {
        self.routing = routing;
        self
    }
}

/// Search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Every document
    MatchAll,
    /// Query-string syntax over the catch-all field; `body.<field>:term`
    /// targets a single field
    QueryString(String),
    /// Exact match on one body field
    Term { field: String, value: String },
    /// Documents resembling `like_text` on the given fields
    MoreLikeThis {
        fields: Vec<String>,
        like_text: String,
    },
    /// Like `MoreLikeThis`, tolerating small edit distances per term
    FuzzyLikeThis {
        fields: Vec<String>,
        like_text: String,
    },
}

/// Search paging and scoping options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub index: String,
    pub doc_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl SearchOptions {
    /// Default page size when none is given
    pub const DEFAULT_LIMIT: usize = 10;

    #[must_use]
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    #[must_use]
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    #[must_use]
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub doc_type: String,
    pub score: f32,
    pub source: serde_json::Value,
}

/// A page of search hits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    pub total: u64,
    pub offset: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchHits {
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.id.clone()).collect()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        (self.offset + self.hits.len()) < self.total as usize
    }
}

/// One item of a bulk write
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Index(Document),
    Delete { id: String, routing: Option<String> },
}

impl BulkOperation {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index(doc) => &doc.id,
            BulkOperation::Delete { id, .. } => id,
        }
    }
}

/// A physical index version as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}
