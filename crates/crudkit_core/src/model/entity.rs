//! Managed record contract.
//!
//! # Responsibility
//! - Define the accessors a record type exposes to the persistence layer.
//! - Provide typed extraction of materialized field values.
//!
//! # Invariants
//! - `field_values()` yields one value per mapped field.
//! - `from_fields()` never reads columns; it only sees field names.

use crate::model::descriptor::{DescriptorBuilder, EntityDescriptor, ValidationError};
use crate::query::NamedQuery;
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Record type managed by the persistence layer.
pub trait Entity: Sized + 'static {
    /// Entity name used by the query language and the registry.
    const NAME: &'static str;

    /// Declares the table mapping on a builder pre-seeded with [`Self::NAME`].
    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder;

    /// Named queries owned by this entity type.
    fn named_queries() -> Vec<NamedQuery> {
        Vec::new()
    }

    /// Primary-key value of this record.
    fn id(&self) -> Value;

    /// Current `(field, value)` pairs for every mapped field.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Rebuilds a record from materialized field values.
    fn from_fields(fields: &FieldValues) -> Result<Self, FieldError>;

    /// Entity-specific rules checked before any write is staged.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Field-keyed values of one materialized row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
    values: BTreeMap<String, Value>,
}

impl FieldValues {
    /// Maps one row of `columns` onto descriptor fields.
    ///
    /// Columns that map to no field are ignored; callers that need a strict
    /// match check the column list before calling this.
    pub fn from_row(descriptor: &EntityDescriptor, columns: &[String], row: Vec<Value>) -> Self {
        let values = columns
            .iter()
            .zip(row)
            .filter_map(|(column, value)| {
                descriptor
                    .mapping_for_column(column)
                    .map(|mapping| (mapping.field.clone(), value))
            })
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Result<&Value, FieldError> {
        self.values
            .get(field)
            .ok_or_else(|| FieldError::Missing(field.to_string()))
    }

    pub fn get_i64(&self, field: &str) -> Result<i64, FieldError> {
        match self.get(field)? {
            Value::Integer(value) => Ok(*value),
            other => Err(FieldError::mismatch(field, "integer", other)),
        }
    }

    pub fn get_i32(&self, field: &str) -> Result<i32, FieldError> {
        let value = self.get_i64(field)?;
        i32::try_from(value).map_err(|_| FieldError::OutOfRange {
            field: field.to_string(),
            value,
        })
    }

    pub fn get_f64(&self, field: &str) -> Result<f64, FieldError> {
        match self.get(field)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            other => Err(FieldError::mismatch(field, "real", other)),
        }
    }

    pub fn get_text(&self, field: &str) -> Result<String, FieldError> {
        match self.get(field)? {
            Value::Text(value) => Ok(value.clone()),
            other => Err(FieldError::mismatch(field, "text", other)),
        }
    }

    pub fn get_opt_text(&self, field: &str) -> Result<Option<String>, FieldError> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            other => Err(FieldError::mismatch(field, "text", other)),
        }
    }
}

/// Row-to-record materialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Missing(String),
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    OutOfRange {
        field: String,
        value: i64,
    },
}

impl FieldError {
    fn mismatch(field: &str, expected: &'static str, found: &Value) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected,
            found: value_type_name(found),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "row has no value for field `{field}`"),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(f, "field `{field}` expected {expected}, found {found}"),
            Self::OutOfRange { field, value } => {
                write!(f, "field `{field}` value {value} is out of range")
            }
        }
    }
}

impl Error for FieldError {}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}
