//! Explicitly owned persistence context.
//!
//! Bundles a unit's configuration, the frozen entity registry and the open
//! connection. Executors and units of work borrow from it, so none of them
//! outlive the connection.

use crate::config::StoreConfig;
use crate::db::{ConnectionProvider, DbResult, StoreConnection};
use crate::query::QueryExecutor;
use crate::registry::EntityRegistry;
use crate::uow::UnitOfWork;
use std::sync::Arc;

#[derive(Debug)]
pub struct PersistenceContext {
    config: StoreConfig,
    registry: Arc<EntityRegistry>,
    connection: StoreConnection,
}

impl PersistenceContext {
    /// Opens a connection for `config` and applies its schema mode.
    pub fn open(config: StoreConfig, registry: Arc<EntityRegistry>) -> DbResult<Self> {
        let provider = ConnectionProvider::new(config);
        let connection = provider.open(Arc::clone(&registry))?;
        Ok(Self {
            config: provider.config().clone(),
            registry,
            connection,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn connection(&self) -> &StoreConnection {
        &self.connection
    }

    /// Read-side executor carrying the unit's timeout and SQL echo settings.
    pub fn executor(&self) -> DbResult<QueryExecutor<'_>> {
        Ok(QueryExecutor::new(self.connection.handle()?, &self.registry)
            .with_timeout(self.config.statement_timeout)
            .with_show_sql(self.config.show_sql))
    }

    /// Fresh, not yet started unit of work.
    pub fn unit_of_work(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(&self.connection, &self.registry)
            .with_timeout(self.config.statement_timeout)
            .with_show_sql(self.config.show_sql)
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Releases the connection. Safe to call more than once.
    pub fn close(&mut self) -> DbResult<()> {
        self.connection.close()
    }
}
