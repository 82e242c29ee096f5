//! Documents derived from primary-store entities

use serde::{Deserialize, Serialize};

use crate::errors::{SyncError, SyncResult};

/// Advanced per-document write options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Serialized form of one entity, produced on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: serde_json::Value,
    #[serde(default)]
    pub options: IndexingOptions,
}

impl Document {
    /// Build a document; the body must be a JSON object
    pub fn new(id: impl Into<String>, body: serde_json::Value) -> SyncResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SyncError::MissingRequiredInput(
                "document id must not be empty".to_string(),
            ));
        }
        if !body.is_object() {
            return Err(SyncError::Other(format!(
                "document {id} body must be a JSON object"
            )));
        }
        Ok(Self {
            id,
            body,
            options: IndexingOptions::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: IndexingOptions) -> Self {
        self.options = options;
        self
    }
}

/// An entity that can be written to the search index
///
/// Implement this for application models. Override `skip_indexing` to keep
/// individual records (drafts, soft-deleted rows) out of the index, and
/// `indexing_options` to attach routing or a parent id.
pub trait Indexable {
    /// Primary key in string form
    fn document_id(&self) -> String;

    /// JSON object body to index
    fn document_body(&self) -> SyncResult<serde_json::Value>;

    fn indexing_options(&self) -> IndexingOptions {
        IndexingOptions::default()
    }

    fn skip_indexing(&self) -> bool {
        false
    }

    fn to_document(&self) -> SyncResult<Document> {
        Ok(Document::new(self.document_id(), self.document_body()?)?
            .with_options(self.indexing_options()))
    }
}

/// Serialize any `Serialize` model as a document body
pub fn serialize_body<T: Serialize + ?Sized>(value: &T) -> SyncResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
