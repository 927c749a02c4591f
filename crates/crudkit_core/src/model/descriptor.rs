//! Entity descriptor: static table/column mapping for one record type.
//!
//! # Responsibility
//! - Describe how a record type maps onto one table.
//! - Generate the DML statements used by the unit of work.
//! - Check field values against column constraints before they reach SQL.
//!
//! # Invariants
//! - Exactly one primary-key column, always the first mapped column.
//! - Field names and column names are unique within one descriptor
//!   (column names compare case-insensitively, as SQLite does).
//! - A built descriptor is never mutated.

use crate::model::entity::value_type_name;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Storage class of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    /// Whether a value of this storage class reads back as this column type.
    /// `NULL` always fits; integers widen into real columns.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Integer, Value::Integer(_))
                | (Self::Real, Value::Real(_) | Value::Integer(_))
                | (Self::Text, Value::Text(_))
                | (Self::Blob, Value::Blob(_))
        )
    }
}

/// One field-to-column mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub field: String,
    pub column: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    /// Maximum character length, only meaningful for text columns.
    pub max_length: Option<u32>,
}

impl ColumnMapping {
    /// Creates a nullable mapping whose column name defaults to the field name.
    pub fn new(field: impl Into<String>, column_type: ColumnType) -> Self {
        let field = field.into();
        Self {
            column: field.clone(),
            field,
            column_type,
            nullable: true,
            unique: false,
            max_length: None,
        }
    }

    pub fn integer(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::Integer)
    }

    pub fn real(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::Real)
    }

    pub fn text(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::Text)
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Checks one value against the column type, nullability and length.
    pub fn check_value(&self, value: &Value) -> Result<(), ValidationError> {
        if !self.column_type.accepts(value) {
            return Err(ValidationError::TypeMismatch {
                field: self.field.clone(),
                expected: self.column_type.sql_name(),
                found: value_type_name(value),
            });
        }
        match value {
            Value::Null if !self.nullable => Err(ValidationError::NullValue {
                field: self.field.clone(),
            }),
            Value::Text(text) => match self.max_length {
                Some(max) if text.chars().count() > max as usize => {
                    Err(ValidationError::TooLong {
                        field: self.field.clone(),
                        max,
                        actual: text.chars().count(),
                    })
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// Descriptor construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    InvalidIdentifier(String),
    MissingPrimaryKey,
    DuplicatePrimaryKey,
    DuplicateField(String),
    DuplicateColumn(String),
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(value) => write!(f, "invalid identifier `{value}`"),
            Self::MissingPrimaryKey => write!(f, "no primary key column declared"),
            Self::DuplicatePrimaryKey => write!(f, "more than one primary key column declared"),
            Self::DuplicateField(field) => write!(f, "field `{field}` is mapped twice"),
            Self::DuplicateColumn(column) => write!(f, "column `{column}` is mapped twice"),
        }
    }
}

impl Error for DescriptorError {}

/// Record-level validation errors raised before any SQL is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NullValue {
        field: String,
    },
    TooLong {
        field: String,
        max: u32,
        actual: usize,
    },
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    MissingField(String),
    UnknownField(String),
    /// Entity-specific rule violation.
    Rule(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NullValue { field } => write!(f, "field `{field}` must not be null"),
            Self::TooLong { field, max, actual } => write!(
                f,
                "field `{field}` exceeds max length {max} (got {actual} chars)"
            ),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(f, "field `{field}` expects {expected}, got {found}"),
            Self::MissingField(field) => write!(f, "no value supplied for field `{field}`"),
            Self::UnknownField(field) => write!(f, "value supplied for unmapped field `{field}`"),
            Self::Rule(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ValidationError {}

/// Immutable mapping of an entity type to its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    entity: String,
    table: String,
    columns: Vec<ColumnMapping>,
}

impl EntityDescriptor {
    /// Starts a descriptor whose table name defaults to the entity name.
    pub fn builder(entity: impl Into<String>) -> DescriptorBuilder {
        let entity = entity.into();
        DescriptorBuilder {
            table: entity.clone(),
            entity,
            id: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn primary_key(&self) -> &ColumnMapping {
        &self.columns[0]
    }

    pub fn mapping_for_field(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|mapping| mapping.field == field)
    }

    pub fn mapping_for_column(&self, column: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|mapping| mapping.column.eq_ignore_ascii_case(column))
    }

    /// Orders `(field, value)` pairs by column position and checks constraints.
    ///
    /// # Errors
    /// - `MissingField` when a mapped field has no value.
    /// - `UnknownField` when a value names an unmapped field.
    /// - Column constraint violations (`NullValue`, `TooLong`).
    pub fn ordered_values(
        &self,
        values: Vec<(&'static str, Value)>,
    ) -> Result<Vec<Value>, ValidationError> {
        let mut slots: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (field, value) in values {
            let position = self
                .columns
                .iter()
                .position(|mapping| mapping.field == field)
                .ok_or_else(|| ValidationError::UnknownField(field.to_string()))?;
            self.columns[position].check_value(&value)?;
            slots[position] = Some(value);
        }

        slots
            .into_iter()
            .zip(&self.columns)
            .map(|(slot, mapping)| {
                slot.ok_or_else(|| ValidationError::MissingField(mapping.field.clone()))
            })
            .collect()
    }

    /// Quoted, comma-separated list of every mapped column.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|mapping| quote_ident(&mapping.column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {}",
            self.column_list(),
            quote_ident(&self.table)
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            self.column_list(),
            numbered_placeholders(self.columns.len())
        )
    }

    /// Insert-or-overwrite keyed on the primary key. Last write wins.
    pub fn upsert_sql(&self) -> String {
        let assignments = self.columns[1..]
            .iter()
            .map(|mapping| {
                let column = quote_ident(&mapping.column);
                format!("{column} = excluded.{column}")
            })
            .collect::<Vec<_>>();
        let action = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        format!(
            "{} ON CONFLICT({}) {action}",
            self.insert_sql(),
            quote_ident(&self.primary_key().column)
        )
    }

    pub fn delete_by_id_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(&self.table),
            quote_ident(&self.primary_key().column)
        )
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table))
    }

    pub(crate) fn rename_table(&mut self, table: String) -> Result<(), DescriptorError> {
        ensure_identifier(&table)?;
        self.table = table;
        Ok(())
    }

    pub(crate) fn rename_column(
        &mut self,
        field: &str,
        column: String,
    ) -> Result<(), DescriptorError> {
        ensure_identifier(&column)?;
        let clash = self.columns.iter().any(|mapping| {
            mapping.field != field && mapping.column.eq_ignore_ascii_case(&column)
        });
        if clash {
            return Err(DescriptorError::DuplicateColumn(column));
        }
        match self.columns.iter_mut().find(|mapping| mapping.field == field) {
            Some(mapping) => {
                mapping.column = column;
                Ok(())
            }
            None => Err(DescriptorError::InvalidIdentifier(field.to_string())),
        }
    }
}

/// Validating builder for [`EntityDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    entity: String,
    table: String,
    id: Vec<ColumnMapping>,
    columns: Vec<ColumnMapping>,
}

impl DescriptorBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Declares the primary-key mapping. It is always stored as non-null.
    pub fn id(mut self, mapping: ColumnMapping) -> Self {
        self.id.push(mapping.not_null());
        self
    }

    pub fn column(mut self, mapping: ColumnMapping) -> Self {
        self.columns.push(mapping);
        self
    }

    pub fn build(self) -> Result<EntityDescriptor, DescriptorError> {
        ensure_identifier(&self.entity)?;
        ensure_identifier(&self.table)?;

        let mut id = self.id.into_iter();
        let primary_key = id.next().ok_or(DescriptorError::MissingPrimaryKey)?;
        if id.next().is_some() {
            return Err(DescriptorError::DuplicatePrimaryKey);
        }

        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(primary_key);
        for mapping in self.columns {
            columns.push(mapping);
        }

        for (index, mapping) in columns.iter().enumerate() {
            ensure_identifier(&mapping.field)?;
            ensure_identifier(&mapping.column)?;
            let earlier = &columns[..index];
            if earlier.iter().any(|other| other.field == mapping.field) {
                return Err(DescriptorError::DuplicateField(mapping.field.clone()));
            }
            if earlier
                .iter()
                .any(|other| other.column.eq_ignore_ascii_case(&mapping.column))
            {
                return Err(DescriptorError::DuplicateColumn(mapping.column.clone()));
            }
        }

        Ok(EntityDescriptor {
            entity: self.entity,
            table: self.table,
            columns,
        })
    }
}

/// Double-quotes an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

fn ensure_identifier(value: &str) -> Result<(), DescriptorError> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(DescriptorError::InvalidIdentifier(value.to_string()))
    }
}

fn numbered_placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{ColumnMapping, ColumnType, DescriptorError, EntityDescriptor, ValidationError};
    use rusqlite::types::Value;

    fn product() -> EntityDescriptor {
        EntityDescriptor::builder("Product")
            .table("Product_2")
            .id(ColumnMapping::integer("id").column("Product_id"))
            .column(ColumnMapping::text("name").max_length(5))
            .column(ColumnMapping::integer("price").not_null())
            .build()
            .expect("descriptor should build")
    }

    #[test]
    fn builder_puts_primary_key_first_and_defaults_column_names() {
        let descriptor = product();
        assert_eq!(descriptor.primary_key().column, "Product_id");
        assert!(!descriptor.primary_key().nullable);
        assert_eq!(descriptor.columns()[1].column, "name");
        assert!(descriptor.mapping_for_column("PRODUCT_ID").is_some());
    }

    #[test]
    fn builder_rejects_missing_key_and_duplicates() {
        let missing = EntityDescriptor::builder("Thing")
            .column(ColumnMapping::text("name"))
            .build();
        assert_eq!(missing.unwrap_err(), DescriptorError::MissingPrimaryKey);

        let duplicate = EntityDescriptor::builder("Thing")
            .id(ColumnMapping::integer("id"))
            .column(ColumnMapping::text("name").column("ID"))
            .build();
        assert_eq!(
            duplicate.unwrap_err(),
            DescriptorError::DuplicateColumn("ID".to_string())
        );

        let bad_table = EntityDescriptor::builder("Thing")
            .table("drop table;")
            .id(ColumnMapping::integer("id"))
            .build();
        assert!(matches!(
            bad_table,
            Err(DescriptorError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn ordered_values_follow_column_order_and_check_constraints() {
        let descriptor = product();
        let values = descriptor
            .ordered_values(vec![
                ("price", Value::Integer(20)),
                ("id", Value::Integer(1)),
                ("name", Value::Text("Soup".to_string())),
            ])
            .unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::Text("Soup".to_string()),
                Value::Integer(20)
            ]
        );

        let too_long = descriptor.ordered_values(vec![
            ("id", Value::Integer(1)),
            ("name", Value::Text("Shampoo".to_string())),
            ("price", Value::Integer(5)),
        ]);
        assert!(matches!(too_long, Err(ValidationError::TooLong { max: 5, .. })));

        let null_price = descriptor.ordered_values(vec![
            ("id", Value::Integer(1)),
            ("name", Value::Null),
            ("price", Value::Null),
        ]);
        assert!(matches!(null_price, Err(ValidationError::NullValue { field }) if field == "price"));

        let missing = descriptor.ordered_values(vec![("id", Value::Integer(1))]);
        assert!(matches!(missing, Err(ValidationError::MissingField(_))));

        let text_price = descriptor.ordered_values(vec![
            ("id", Value::Integer(1)),
            ("name", Value::Text("Soup".to_string())),
            ("price", Value::Text("cheap".to_string())),
        ]);
        assert!(matches!(
            text_price,
            Err(ValidationError::TypeMismatch { expected: "INTEGER", found: "text", .. })
        ));
    }

    #[test]
    fn column_types_accept_matching_storage_classes() {
        assert!(ColumnType::Integer.accepts(&Value::Integer(3)));
        assert!(ColumnType::Real.accepts(&Value::Integer(3)));
        assert!(ColumnType::Text.accepts(&Value::Null));
        assert!(!ColumnType::Integer.accepts(&Value::Real(1.5)));
        assert!(!ColumnType::Text.accepts(&Value::Integer(7)));
        assert!(!ColumnType::Blob.accepts(&Value::Text("x".to_string())));
    }

    #[test]
    fn upsert_overwrites_every_non_key_column() {
        let sql = product().upsert_sql();
        assert!(sql.starts_with("INSERT INTO \"Product_2\""));
        assert!(sql.ends_with(
            "ON CONFLICT(\"Product_id\") DO UPDATE SET \"name\" = excluded.\"name\", \"price\" = excluded.\"price\""
        ));
    }
}
