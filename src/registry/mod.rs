//! Explicit registry of indexed entity types
//!
//! The registry is built once at startup and shared as `Arc<EntityRegistry>`
//! with the dispatcher, version manager and workers. There is no ambient
//! global: every component receives the registry it operates on.

pub mod entity_type;
pub mod mapping;
pub mod policy;

pub use entity_type::{EntityType, EntityTypeDefinition, is_valid_index_name};
pub use mapping::{FieldKind, FieldMapping, IndexOptions, Mapping};
pub use policy::{PolicyCell, UpdatePolicy};

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{SyncError, SyncResult};

/// Registered entity types keyed by name
#[derive(Debug, Default)]
pub struct EntityRegistry {
    types: HashMap<String, Arc<EntityType>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions, failing on the first invalid one
    pub fn from_definitions<I>(definitions: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = EntityTypeDefinition>,
    {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Register one entity type
    pub fn register(&mut self, definition: EntityTypeDefinition) -> SyncResult<Arc<EntityType>> {
        if self.types.contains_key(&definition.name) {
            return Err(SyncError::DuplicateEntityType(definition.name));
        }

        let entity = Arc::new(EntityType::from_definition(definition)?);
        tracing::debug!(
            entity_type = entity.name(),
            index = entity.index_name(),
            policy = %entity.update_policy(),
            "Registered indexed entity type"
        );
        self.types
            .insert(entity.name().to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    /// Look up an entity type by name
    pub fn get(&self, name: &str) -> SyncResult<Arc<EntityType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownEntityType(name.to_string()))
    }

    /// Validated policy assignment
    pub fn set_policy(&self, name: &str, raw: &str) -> SyncResult<UpdatePolicy> {
        let entity = self.get(name)?;
        let policy = entity.set_update_policy(raw)?;
        tracing::info!(entity_type = name, policy = %policy, "Update policy changed");
        Ok(policy)
    }

    /// All registered types, sorted by name
    #[must_use]
    pub fn entity_types(&self) -> Vec<Arc<EntityType>> {
        let mut all: Vec<_> = self.types.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
