//! Façade-level error aggregating every layer below it.

use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::descriptor::ValidationError;
use crate::query::QueryError;
use crate::registry::RegistryError;
use crate::uow::UowError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CrudResult<T> = Result<T, CrudError>;

#[derive(Debug)]
pub enum CrudError {
    Config(ConfigError),
    Db(DbError),
    Registry(RegistryError),
    Query(QueryError),
    Uow(UowError),
    Validation(ValidationError),
    /// Primary keys are immutable through field updates.
    PrimaryKeyUpdate { entity: String, field: String },
}

impl Display for CrudError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Uow(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::PrimaryKeyUpdate { entity, field } => write!(
                f,
                "field `{field}` is the primary key of `{entity}` and cannot be updated"
            ),
        }
    }
}

impl Error for CrudError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Uow(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::PrimaryKeyUpdate { .. } => None,
        }
    }
}

impl From<ConfigError> for CrudError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for CrudError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RegistryError> for CrudError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<QueryError> for CrudError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<UowError> for CrudError {
    fn from(value: UowError) -> Self {
        Self::Uow(value)
    }
}

impl From<ValidationError> for CrudError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
