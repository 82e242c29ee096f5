//! Registered entity types

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use super::mapping::{IndexOptions, Mapping};
use super::policy::{PolicyCell, UpdatePolicy};
use crate::errors::{SyncError, SyncResult};

/// Registration input for one entity type
///
/// Mirrors the registration surface read from configuration: everything but
/// the name is optional and falls back to derived defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_options: Option<IndexOptions>,
    /// Raw policy value; validated when the definition is registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<String>,
}

impl EntityTypeDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    #[must_use]
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    #[must_use]
    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    #[must_use]
    pub fn index_options(mut self, options: IndexOptions) -> Self {
        self.index_options = Some(options);
        self
    }

    #[must_use]
    pub fn updates(mut self, policy: impl Into<String>) -> Self {
        self.updates = Some(policy.into());
        self
    }
}

/// A registered, indexed entity type
///
/// Everything is fixed at registration except the update policy, which can
/// only change through the validated setter.
#[derive(Debug)]
pub struct EntityType {
    name: String,
    index_name: String,
    doc_type: String,
    mapping: Option<Mapping>,
    index_options: IndexOptions,
    policy: PolicyCell,
}

impl EntityType {
    /// Build from a definition, validating the policy value and index name
    pub fn from_definition(definition: EntityTypeDefinition) -> SyncResult<Self> {
        let policy = match definition.updates.as_deref() {
            Some(raw) => raw.parse::<UpdatePolicy>()?,
            None => UpdatePolicy::default(),
        };

        let doc_type = definition
            .doc_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_doc_type(&definition.name));
        let index_name = definition
            .index_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| doc_type.clone());
        if !is_valid_index_name(&index_name) {
            return Err(SyncError::Config(format!(
                "entity type {}: invalid index name '{index_name}' \
                 (lowercase letters, digits, '_', '-' and '.' only)",
                definition.name
            )));
        }

        Ok(Self {
            name: definition.name,
            index_name,
            doc_type,
            mapping: definition.mapping.filter(|m| !m.is_empty()),
            index_options: definition.index_options.unwrap_or_default(),
            policy: PolicyCell::new(policy),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    #[must_use]
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    #[must_use]
    pub fn mapping(&self) -> Option<&Mapping> {
        self.mapping.as_ref()
    }

    #[must_use]
    pub fn index_options(&self) -> &IndexOptions {
        &self.index_options
    }

    #[inline]
    #[must_use]
    pub fn update_policy(&self) -> UpdatePolicy {
        self.policy.get()
    }

    /// Assign a policy from its raw value; the prior policy survives a bad value
    pub fn set_update_policy(&self, raw: &str) -> SyncResult<UpdatePolicy> {
        let policy = raw.parse::<UpdatePolicy>()?;
        self.policy.set(policy);
        Ok(policy)
    }

    /// Assign an already-typed policy
    pub fn set_policy(&self, policy: UpdatePolicy) {
        self.policy.set(policy);
    }
}

/// Index names are lowercase ASCII words that cannot start with a dot
#[must_use]
pub fn is_valid_index_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
}

/// `Admin::BlogPost` becomes `admin-blog_post`
fn default_doc_type(name: &str) -> String {
    name.replace("::", "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_case(Case::Snake))
        .collect::<Vec<_>>()
        .join("-")
}
