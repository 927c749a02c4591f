//! SQLite connection provider and schema generation.
//!
//! # Responsibility
//! - Open and release store connections for a persistence unit.
//! - Bring mapped tables in line with the unit's schema mode.
//!
//! # Invariants
//! - A returned connection has its schema mode fully applied.
//! - Closing a connection is idempotent and also happens on drop.

use crate::config::ConfigError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;

pub use open::{ConnectionProvider, StoreConnection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Config(ConfigError),
    ConnectionClosed,
    MissingTable(String),
    MissingColumn { table: String, column: String },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::ConnectionClosed => write!(f, "connection is already closed"),
            Self::MissingTable(table) => {
                write!(f, "schema validation failed: table `{table}` does not exist")
            }
            Self::MissingColumn { table, column } => write!(
                f,
                "schema validation failed: table `{table}` has no column `{column}`"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<ConfigError> for DbError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
