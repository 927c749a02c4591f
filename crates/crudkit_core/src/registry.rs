//! Entity descriptor registry.
//!
//! # Responsibility
//! - Resolve record types (and entity names) to their descriptors.
//! - Hold the named queries declared by each registered entity.
//!
//! # Invariants
//! - Entity names, table names and named-query names are unique.
//! - A built registry has no mutation API; it is shared read-only.

use crate::config::MappingOverride;
use crate::model::descriptor::{DescriptorError, EntityDescriptor};
use crate::model::entity::Entity;
use crate::query::NamedQuery;
use log::debug;
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidDescriptor {
        entity: String,
        source: DescriptorError,
    },
    DuplicateEntity(String),
    DuplicateTable(String),
    DuplicateQuery(String),
    /// The record type was never registered.
    UnmappedType(&'static str),
    UnknownEntity(String),
    UnknownQuery(String),
    /// An override names a field the entity does not map.
    UnknownOverrideField {
        entity: String,
        field: String,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDescriptor { entity, source } => {
                write!(f, "invalid mapping for entity `{entity}`: {source}")
            }
            Self::DuplicateEntity(entity) => write!(f, "entity `{entity}` registered twice"),
            Self::DuplicateTable(table) => write!(f, "table `{table}` mapped by two entities"),
            Self::DuplicateQuery(name) => write!(f, "named query `{name}` declared twice"),
            Self::UnmappedType(type_name) => write!(f, "type `{type_name}` is not a mapped entity"),
            Self::UnknownEntity(entity) => write!(f, "unknown entity `{entity}`"),
            Self::UnknownQuery(name) => write!(f, "unknown named query `{name}`"),
            Self::UnknownOverrideField { entity, field } => {
                write!(f, "mapping override for `{entity}` names unknown field `{field}`")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDescriptor { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Read-only mapping table built once at startup.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    descriptors: BTreeMap<String, EntityDescriptor>,
    by_type: HashMap<TypeId, String>,
    named_queries: BTreeMap<String, NamedQuery>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolves the descriptor of a registered record type.
    pub fn resolve<E: Entity>(&self) -> Result<&EntityDescriptor, RegistryError> {
        self.by_type
            .get(&TypeId::of::<E>())
            .and_then(|entity| self.descriptors.get(entity))
            .ok_or(RegistryError::UnmappedType(type_name::<E>()))
    }

    /// Resolves a descriptor by entity name, as written in entity queries.
    pub fn resolve_name(&self, entity: &str) -> Result<&EntityDescriptor, RegistryError> {
        self.descriptors
            .get(entity)
            .ok_or_else(|| RegistryError::UnknownEntity(entity.to_string()))
    }

    pub fn named_query(&self, name: &str) -> Result<&NamedQuery, RegistryError> {
        self.named_queries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownQuery(name.to_string()))
    }

    /// Descriptors sorted by entity name.
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.descriptors.values()
    }

    pub fn named_query_names(&self) -> Vec<String> {
        self.named_queries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Collects entity registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: EntityRegistry,
    overrides: BTreeMap<String, MappingOverride>,
}

impl RegistryBuilder {
    /// Applies table/column overrides to entities registered afterwards.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, MappingOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Registers `E` with its declared mapping and named queries.
    pub fn register<E: Entity>(mut self) -> Result<Self, RegistryError> {
        let invalid = |source| RegistryError::InvalidDescriptor {
            entity: E::NAME.to_string(),
            source,
        };

        let mut descriptor = E::describe(EntityDescriptor::builder(E::NAME))
            .build()
            .map_err(invalid)?;
        if let Some(mapping) = self.overrides.get(E::NAME) {
            apply_override(&mut descriptor, mapping)?;
        }

        let registry = &mut self.registry;
        if registry.descriptors.contains_key(E::NAME)
            || registry.by_type.contains_key(&TypeId::of::<E>())
        {
            return Err(RegistryError::DuplicateEntity(E::NAME.to_string()));
        }
        if registry
            .descriptors
            .values()
            .any(|other| other.table().eq_ignore_ascii_case(descriptor.table()))
        {
            return Err(RegistryError::DuplicateTable(descriptor.table().to_string()));
        }

        let queries = E::named_queries();
        for (index, query) in queries.iter().enumerate() {
            let repeated = queries[..index].iter().any(|other| other.name == query.name);
            if repeated || registry.named_queries.contains_key(&query.name) {
                return Err(RegistryError::DuplicateQuery(query.name.clone()));
            }
        }

        debug!(
            "event=entity_register module=registry status=ok entity={} table={} columns={} named_queries={}",
            E::NAME,
            descriptor.table(),
            descriptor.columns().len(),
            queries.len()
        );

        for query in queries {
            registry.named_queries.insert(query.name.clone(), query);
        }
        registry
            .by_type
            .insert(TypeId::of::<E>(), E::NAME.to_string());
        registry.descriptors.insert(E::NAME.to_string(), descriptor);
        Ok(self)
    }

    pub fn build(self) -> EntityRegistry {
        self.registry
    }
}

fn apply_override(
    descriptor: &mut EntityDescriptor,
    mapping: &MappingOverride,
) -> Result<(), RegistryError> {
    let entity = descriptor.entity().to_string();
    let invalid = |source| RegistryError::InvalidDescriptor {
        entity: entity.clone(),
        source,
    };

    if let Some(table) = &mapping.table {
        descriptor.rename_table(table.clone()).map_err(invalid)?;
    }
    for (field, column) in &mapping.columns {
        if descriptor.mapping_for_field(field).is_none() {
            return Err(RegistryError::UnknownOverrideField {
                entity: entity.clone(),
                field: field.clone(),
            });
        }
        descriptor
            .rename_column(field, column.clone())
            .map_err(invalid)?;
    }
    Ok(())
}
