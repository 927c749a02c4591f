//! Connection provider for SQLite persistence units.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections for a configured unit.
//! - Configure pragmas and apply the unit's schema mode.
//! - Release connections exactly once, explicitly or on drop.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - `close()` is idempotent; a closed connection hands out no handle.

use super::schema::{apply_schema, drop_schema};
use super::{DbError, DbResult};
use crate::config::{SchemaMode, StoreConfig, StoreLocation};
use crate::registry::EntityRegistry;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands out connections for one persistence unit.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    config: StoreConfig,
}

impl ConnectionProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Loads the named unit from a configuration file.
    ///
    /// # Errors
    /// - `DbError::Config` when the file or unit is missing or malformed.
    pub fn from_config_file(path: impl AsRef<Path>, unit: &str) -> DbResult<Self> {
        let config = StoreConfig::load(path, unit).map_err(|err| {
            error!(
                "event=config_load module=db status=error unit={} error_code=config_invalid error={}",
                unit, err
            );
            err
        })?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens a connection and applies the unit's schema mode for `registry`.
    ///
    /// # Side effects
    /// - May create the database file and issue DDL.
    /// - Emits `db_open` logging events with duration and status.
    pub fn open(&self, registry: Arc<EntityRegistry>) -> DbResult<StoreConnection> {
        let started_at = Instant::now();
        let mode = match self.config.location {
            StoreLocation::Memory => "memory",
            StoreLocation::File(_) => "file",
        };
        info!(
            "event=db_open module=db status=start unit={} mode={} schema_mode={}",
            self.config.unit,
            mode,
            self.config.schema_mode.as_str()
        );

        let opened = match &self.config.location {
            StoreLocation::Memory => Connection::open_in_memory(),
            StoreLocation::File(path) => Connection::open(path),
        };
        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=db_open module=db status=error unit={} mode={} duration_ms={} error_code=db_open_failed error={}",
                    self.config.unit,
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        if let Err(err) = self.bootstrap(&conn, &registry) {
            error!(
                "event=db_open module=db status=error unit={} mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                self.config.unit,
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=db_open module=db status=ok unit={} mode={} tables={} duration_ms={}",
            self.config.unit,
            mode,
            registry.len(),
            started_at.elapsed().as_millis()
        );
        Ok(StoreConnection {
            conn: Some(conn),
            unit: self.config.unit.clone(),
            drop_on_close: self.config.schema_mode == SchemaMode::CreateDrop,
            registry,
        })
    }

    fn bootstrap(&self, conn: &Connection, registry: &EntityRegistry) -> DbResult<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(self.config.statement_timeout.unwrap_or(DEFAULT_BUSY_TIMEOUT))?;
        if self.config.credentials.is_some() {
            debug!(
                "event=db_open module=db status=ok unit={} credentials=ignored driver={}",
                self.config.unit, self.config.driver
            );
        }
        apply_schema(conn, registry, self.config.schema_mode)
    }
}

/// Owned store connection with scoped release.
#[derive(Debug)]
pub struct StoreConnection {
    conn: Option<Connection>,
    unit: String,
    drop_on_close: bool,
    registry: Arc<EntityRegistry>,
}

impl StoreConnection {
    /// Borrows the live connection.
    ///
    /// # Errors
    /// - `ConnectionClosed` after `close()`.
    pub fn handle(&self) -> DbResult<&Connection> {
        self.conn.as_ref().ok_or(DbError::ConnectionClosed)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Releases the connection. Repeated calls are no-ops.
    ///
    /// Under `create-drop` the mapped tables are dropped first.
    pub fn close(&mut self) -> DbResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let started_at = Instant::now();

        let dropped = if self.drop_on_close {
            drop_schema(&conn, &self.registry)
        } else {
            Ok(())
        };
        let closed = conn.close().map_err(|(_, err)| DbError::Sqlite(err));

        match dropped.and(closed) {
            Ok(()) => {
                info!(
                    "event=db_close module=db status=ok unit={} duration_ms={}",
                    self.unit,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=db_close module=db status=error unit={} duration_ms={} error_code=db_close_failed error={}",
                    self.unit,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

impl Drop for StoreConnection {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!(
                "event=db_close module=db status=implicit unit={}",
                self.unit
            );
            let _ = self.close();
        }
    }
}
