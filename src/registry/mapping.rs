//! Field-level mapping and index creation options

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field types understood by the mapping check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Keyword,
    Long,
    Double,
    Boolean,
    Date,
    Object,
}

impl FieldKind {
    fn accepts(self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        match (self, value) {
            (_, Value::Null) => true,
            (FieldKind::Text | FieldKind::Keyword, Value::String(_)) => true,
            (FieldKind::Long, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldKind::Double, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Date, Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            (FieldKind::Object, Value::Object(_)) => true,
            // Arrays are checked element-wise, as multi-valued fields
            (kind, Value::Array(items)) => items.iter().all(|item| kind.accepts(item)),
            _ => false,
        }
    }
}

/// Mapping definition for a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

/// Field-level schema applied to an index version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub properties: BTreeMap<String, FieldMapping>,
}

impl Mapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.properties.insert(name.into(), FieldMapping { kind });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Check a document body against the mapped top-level fields
    ///
    /// Unmapped fields are accepted as-is. Returns the offending field name
    /// and expected type on the first mismatch.
    pub fn check(&self, body: &serde_json::Value) -> Result<(), String> {
        let Some(object) = body.as_object() else {
            return Err("document body must be a JSON object".to_string());
        };

        for (name, mapping) in &self.properties {
            if let Some(value) = object.get(name)
                && !mapping.kind.accepts(value)
            {
                return Err(format!(
                    "field '{name}' expected {:?}, found {value}",
                    mapping.kind
                ));
            }
        }
        Ok(())
    }
}

/// Options used when creating a physical index version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Writer memory budget in bytes; falls back to the client default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_memory_limit: Option<usize>,
    /// Opaque settings persisted alongside the version
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article_mapping() -> Mapping {
        Mapping::new()
            .field("title", FieldKind::Text)
            .field("views", FieldKind::Long)
            .field("published", FieldKind::Boolean)
            .field("created_at", FieldKind::Date)
    }

    #[test]
    fn accepts_matching_and_unmapped_fields() {
        let body = json!({
            "title": "Snails",
            "views": 12,
            "published": true,
            "created_at": "2010-10-25",
            "extra": [1, 2, 3]
        });
        assert!(article_mapping().check(&body).is_ok());
    }

    #[test]
    fn rejects_type_mismatch() {
        let body = json!({ "title": "Snails", "views": "many" });
        let err = article_mapping().check(&body).expect_err("views is a long");
        assert!(err.contains("views"));
    }

    #[test]
    fn rejects_non_object_body() {
        assert!(Mapping::new().check(&json!([1, 2])).is_err());
    }

    #[test]
    fn deserializes_elasticsearch_style_properties() {
        let mapping: Mapping = serde_json::from_value(json!({
            "properties": { "name": { "type": "keyword" }, "age": { "type": "long" } }
        }))
        .expect("valid mapping");
        assert_eq!(mapping.properties.len(), 2);
        assert_eq!(mapping.properties["name"].kind, FieldKind::Keyword);
    }
}
