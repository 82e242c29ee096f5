//! Tantivy schema shared by every index version
//!
//! The document body is indexed twice: as a JSON field (`body.<path>:term`
//! queries) and flattened into the `_all` catch-all text field used for
//! plain query strings. The original body is kept verbatim in `_source`.

use tantivy::schema::{Field, STORED, STRING, Schema, TEXT};
use tantivy::TantivyDocument;

use crate::document::Document;
use crate::errors::{RejectionKind, SyncError, SyncResult};

pub(crate) const ID_FIELD: &str = "_id";
pub(crate) const TYPE_FIELD: &str = "_type";
pub(crate) const ROUTING_FIELD: &str = "_routing";
pub(crate) const PARENT_FIELD: &str = "_parent";
pub(crate) const SOURCE_FIELD: &str = "_source";
pub(crate) const ALL_FIELD: &str = "_all";
pub(crate) const BODY_FIELD: &str = "body";

/// Field handles of the document schema
#[derive(Debug, Clone)]
pub(crate) struct DocumentSchema {
    pub schema: Schema,
    pub id: Field,
    pub doc_type: Field,
    pub source: Field,
    pub all: Field,
    pub body: Field,
}

impl DocumentSchema {
    /// Build the schema used when creating a new version
    pub fn build() -> Schema {
        let mut builder = Schema::builder();
        builder.add_text_field(ID_FIELD, STRING | STORED);
        builder.add_text_field(TYPE_FIELD, STRING | STORED);
        builder.add_text_field(ROUTING_FIELD, STRING | STORED);
        builder.add_text_field(PARENT_FIELD, STRING | STORED);
        builder.add_text_field(SOURCE_FIELD, STORED);
        builder.add_text_field(ALL_FIELD, TEXT);
        builder.add_json_field(BODY_FIELD, TEXT);
        builder.build()
    }

    /// Resolve field handles from an existing index schema
    pub fn from_schema(schema: Schema) -> SyncResult<Self> {
        let field = |name: &str| {
            schema.get_field(name).map_err(|_| {
                SyncError::rejected(
                    RejectionKind::Other,
                    format!("index schema is missing field '{name}'"),
                )
            })
        };

        Ok(Self {
            id: field(ID_FIELD)?,
            doc_type: field(TYPE_FIELD)?,
            source: field(SOURCE_FIELD)?,
            all: field(ALL_FIELD)?,
            body: field(BODY_FIELD)?,
            schema,
        })
    }

    /// Convert a document into its Tantivy form
    pub fn to_tantivy(&self, doc: &Document, doc_type: &str) -> SyncResult<TantivyDocument> {
        let mut json = serde_json::Map::with_capacity(7);
        json.insert(ID_FIELD.into(), doc.id.clone().into());
        json.insert(TYPE_FIELD.into(), doc_type.into());
        if let Some(routing) = &doc.options.routing {
            json.insert(ROUTING_FIELD.into(), routing.clone().into());
        }
        if let Some(parent) = &doc.options.parent {
            json.insert(PARENT_FIELD.into(), parent.clone().into());
        }
        json.insert(SOURCE_FIELD.into(), doc.body.to_string().into());
        json.insert(ALL_FIELD.into(), catch_all_text(&doc.body).into());
        json.insert(BODY_FIELD.into(), doc.body.clone());

        let encoded = serde_json::Value::Object(json).to_string();
        TantivyDocument::parse_json(&self.schema, &encoded).map_err(|e| {
            SyncError::rejected(
                RejectionKind::MappingConflict,
                format!("document {} could not be parsed: {e}", doc.id),
            )
        })
    }
}

/// Flatten every scalar leaf of a JSON value into one space-separated string
pub(crate) fn catch_all_text(value: &serde_json::Value) -> String {
    fn collect(value: &serde_json::Value, out: &mut String) {
        use serde_json::Value;

        match value {
            Value::Null => {}
            Value::Bool(b) => push_word(out, if *b { "true" } else { "false" }),
            Value::Number(n) => push_word(out, &n.to_string()),
            Value::String(s) => push_word(out, s),
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            Value::Object(map) => map.values().for_each(|item| collect(item, out)),
        }
    }

    fn push_word(out: &mut String, word: &str) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }

    let mut out = String::new();
    collect(value, &mut out);
    out
}
