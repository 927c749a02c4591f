//! DDL generation from entity descriptors.
//!
//! # Invariants
//! - Every mode except `None` touches only tables the registry maps.
//! - `Create` / `Update` run inside one transaction.

use crate::config::SchemaMode;
use crate::db::{DbError, DbResult};
use crate::model::descriptor::{quote_ident, ColumnMapping, ColumnType, EntityDescriptor};
use crate::registry::EntityRegistry;
use log::debug;
use rusqlite::Connection;

/// Applies `mode` to every table mapped by `registry`.
pub fn apply_schema(
    conn: &Connection,
    registry: &EntityRegistry,
    mode: SchemaMode,
) -> DbResult<()> {
    match mode {
        SchemaMode::None => Ok(()),
        SchemaMode::Validate => registry
            .descriptors()
            .try_for_each(|descriptor| validate_table(conn, descriptor)),
        SchemaMode::Update => {
            let tx = conn.unchecked_transaction()?;
            for descriptor in registry.descriptors() {
                tx.execute_batch(&create_table_sql(descriptor, true))?;
            }
            tx.commit()?;
            Ok(())
        }
        SchemaMode::Create | SchemaMode::CreateDrop => {
            let tx = conn.unchecked_transaction()?;
            for descriptor in registry.descriptors() {
                tx.execute_batch(&drop_table_sql(descriptor))?;
                tx.execute_batch(&create_table_sql(descriptor, false))?;
            }
            tx.commit()?;
            Ok(())
        }
    }
}

/// Drops every mapped table. Used by `create-drop` on close.
pub fn drop_schema(conn: &Connection, registry: &EntityRegistry) -> DbResult<()> {
    let tx = conn.unchecked_transaction()?;
    for descriptor in registry.descriptors() {
        tx.execute_batch(&drop_table_sql(descriptor))?;
    }
    tx.commit()?;
    Ok(())
}

pub fn create_table_sql(descriptor: &EntityDescriptor, if_not_exists: bool) -> String {
    let columns = descriptor
        .columns()
        .iter()
        .enumerate()
        .map(|(index, mapping)| column_definition(mapping, index == 0))
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        "CREATE TABLE {}{} (\n    {columns}\n);",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote_ident(descriptor.table())
    )
}

pub fn drop_table_sql(descriptor: &EntityDescriptor) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(descriptor.table()))
}

fn column_definition(mapping: &ColumnMapping, primary_key: bool) -> String {
    let column = quote_ident(&mapping.column);
    let mut definition = format!("{column} {}", mapping.column_type.sql_name());
    if primary_key {
        definition.push_str(" PRIMARY KEY");
    }
    if !mapping.nullable {
        definition.push_str(" NOT NULL");
    }
    if mapping.unique && !primary_key {
        definition.push_str(" UNIQUE");
    }
    if let (ColumnType::Text, Some(max)) = (mapping.column_type, mapping.max_length) {
        definition.push_str(&format!(" CHECK (length({column}) <= {max})"));
    }
    definition
}

fn validate_table(conn: &Connection, descriptor: &EntityDescriptor) -> DbResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let existing = stmt
        .query_map([descriptor.table()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if existing.is_empty() {
        return Err(DbError::MissingTable(descriptor.table().to_string()));
    }
    for mapping in descriptor.columns() {
        if !existing
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&mapping.column))
        {
            return Err(DbError::MissingColumn {
                table: descriptor.table().to_string(),
                column: mapping.column.clone(),
            });
        }
    }

    debug!(
        "event=schema_validate module=db status=ok table={} columns={}",
        descriptor.table(),
        existing.len()
    );
    Ok(())
}
