//! Typed data-access layer over SQLite.
//!
//! Records map to tables through [`model::EntityDescriptor`]s collected in an
//! [`registry::EntityRegistry`]. Mutations are buffered in a
//! [`uow::UnitOfWork`] and flushed atomically on commit; reads go straight
//! through a [`query::QueryExecutor`].

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod registry;
pub mod service;
pub mod uow;

pub use config::{ConfigError, SchemaMode, StoreConfig};
pub use context::PersistenceContext;
pub use db::{ConnectionProvider, DbError, StoreConnection};
pub use error::{CrudError, CrudResult};
pub use logging::{default_log_level, init_logging, logging_status, parse_level};
pub use model::{Employee, Entity, EntityDescriptor, Product, Student};
pub use query::{
    CompareOp, FromScalar, NamedQuery, Predicate, Query, QueryError, QueryExecutor,
    ResultShape, ResultSet, Rows,
};
pub use registry::{EntityRegistry, RegistryError};
pub use rusqlite::types::Value;
pub use service::CrudService;
pub use uow::{CommitSummary, OperationId, TransactionState, UnitOfWork, UowError};

/// Registry of the sample records shipped with the crate.
pub fn sample_registry(
    overrides: std::collections::BTreeMap<String, config::MappingOverride>,
) -> Result<EntityRegistry, RegistryError> {
    Ok(EntityRegistry::builder()
        .with_overrides(overrides)
        .register::<Employee>()?
        .register::<Student>()?
        .register::<Product>()?
        .build())
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, sample_registry};
    use std::collections::BTreeMap;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn sample_registry_maps_every_record() {
        let registry = sample_registry(BTreeMap::new()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.named_query_names().len(), 3);
    }
}
