//! CRUD façade.
//!
//! # Responsibility
//! - Provide insert / read / update / delete / count entry points for
//!   callers that do not manage units of work themselves.
//! - Offer `stage_*` variants that add to a caller-owned unit instead.
//!
//! # Invariants
//! - Every mutating call without an ambient unit opens, commits and drops
//!   exactly one unit of work.
//! - Reads never open a unit of work.
//! - Primary keys are never changed through `update_field`.

use crate::context::PersistenceContext;
use crate::error::{CrudError, CrudResult};
use crate::model::descriptor::{quote_ident, EntityDescriptor};
use crate::model::entity::Entity;
use crate::query::{FromScalar, Predicate, Query, QueryError, QueryExecutor, Rows};
use crate::uow::{in_unit_of_work, OperationId, UnitOfWork};
use log::info;
use rusqlite::types::Value;
use std::time::Instant;

/// Use-case service over one persistence context.
#[derive(Debug, Clone, Copy)]
pub struct CrudService<'ctx> {
    context: &'ctx PersistenceContext,
}

impl<'ctx> CrudService<'ctx> {
    pub fn new(context: &'ctx PersistenceContext) -> Self {
        Self { context }
    }

    /// Persists every record in one unit of work.
    ///
    /// # Contract
    /// - All or nothing: a rejected record rolls back the whole batch.
    /// - Returns the number of rows inserted.
    pub fn insert_many<E: Entity>(&self, records: &[E]) -> CrudResult<usize> {
        let started_at = Instant::now();
        let (_, summary) = in_unit_of_work(self.context.unit_of_work(), |unit| {
            self.stage_insert_many(unit, records)
        })?;
        info!(
            "event=crud_insert module=service status=ok entity={} rows={} duration_ms={}",
            E::NAME,
            summary.total(),
            started_at.elapsed().as_millis()
        );
        Ok(summary.total())
    }

    pub fn stage_insert_many<E: Entity>(
        &self,
        unit: &mut UnitOfWork<'_>,
        records: &[E],
    ) -> CrudResult<Vec<OperationId>> {
        records
            .iter()
            .map(|record| unit.persist(record).map_err(CrudError::from))
            .collect()
    }

    /// Insert-or-overwrite of one record in its own unit of work.
    pub fn merge<E: Entity>(&self, record: &E) -> CrudResult<usize> {
        let (_, summary) =
            in_unit_of_work(self.context.unit_of_work(), |unit| unit.merge(record))?;
        Ok(summary.total())
    }

    pub fn remove_by_id<E: Entity>(&self, id: impl Into<Value>) -> CrudResult<usize> {
        let (_, summary) = in_unit_of_work(self.context.unit_of_work(), |unit| {
            unit.remove_by_id::<E>(id)
        })?;
        Ok(summary.total())
    }

    /// Looks a record up by primary key. Absence is `Ok(None)`.
    pub fn find_by_id<E: Entity>(&self, id: impl Into<Value>) -> CrudResult<Option<E>> {
        Ok(self.executor()?.find::<E>(id)?)
    }

    pub fn find_all<E: Entity>(&self) -> CrudResult<Vec<E>> {
        Ok(self.executor()?.find_all::<E>()?)
    }

    pub fn find_where<E: Entity>(&self, predicate: &Predicate) -> CrudResult<Vec<E>> {
        let descriptor = self.context.registry().resolve::<E>()?;
        let query = filtered(descriptor.select_sql(), descriptor, predicate)?;
        Ok(self.executor()?.fetch_entities::<E>(&query)?)
    }

    /// Selected fields of matching rows, labelled by field name.
    ///
    /// An empty `fields` list selects every mapped field.
    pub fn project<E: Entity>(
        &self,
        fields: &[&str],
        predicate: &Predicate,
    ) -> CrudResult<Rows> {
        let descriptor = self.context.registry().resolve::<E>()?;
        let selected = if fields.is_empty() {
            descriptor
                .columns()
                .iter()
                .map(|mapping| mapping.field.as_str())
                .collect()
        } else {
            fields.to_vec()
        };
        let columns = selected
            .iter()
            .map(|field| {
                column_of(descriptor, field)
                    .map(|column| format!("{column} AS {}", quote_ident(field)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote_ident(descriptor.table())
        );
        let query = filtered(sql, descriptor, predicate)?;
        Ok(self.executor()?.fetch_projection(&query)?)
    }

    pub fn count<E: Entity>(&self) -> CrudResult<i64> {
        let descriptor = self.context.registry().resolve::<E>()?;
        Ok(self
            .executor()?
            .fetch_scalar::<i64>(&Query::native(descriptor.count_sql()))?)
    }

    /// Sets one field on the record with primary key `id`.
    ///
    /// # Contract
    /// - Returns rows affected; `0` when no record has that key.
    /// - The primary key itself is rejected with `PrimaryKeyUpdate`.
    pub fn update_field<E: Entity>(
        &self,
        id: impl Into<Value>,
        field: &str,
        value: impl Into<Value>,
    ) -> CrudResult<usize> {
        let (_, summary) = in_unit_of_work(self.context.unit_of_work(), |unit| {
            self.stage_update_field::<E>(unit, id, field, value)
        })?;
        Ok(summary.total())
    }

    pub fn stage_update_field<E: Entity>(
        &self,
        unit: &mut UnitOfWork<'_>,
        id: impl Into<Value>,
        field: &str,
        value: impl Into<Value>,
    ) -> CrudResult<OperationId> {
        let descriptor = self.context.registry().resolve::<E>()?;
        let mapping = descriptor
            .mapping_for_field(field)
            .ok_or_else(|| QueryError::UnknownField {
                entity: E::NAME.to_string(),
                field: field.to_string(),
            })?;
        if mapping.field == descriptor.primary_key().field {
            return Err(CrudError::PrimaryKeyUpdate {
                entity: E::NAME.to_string(),
                field: field.to_string(),
            });
        }
        let value = value.into();
        mapping.check_value(&value)?;

        let query = Query::native(format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote_ident(descriptor.table()),
            quote_ident(&mapping.column),
            quote_ident(&descriptor.primary_key().column)
        ))
        .bind(value)
        .bind(id);
        Ok(unit.execute_update(&query)?)
    }

    /// Deletes every matching record; returns `0` when nothing matches.
    pub fn delete_where<E: Entity>(&self, predicate: &Predicate) -> CrudResult<usize> {
        let (_, summary) = in_unit_of_work(self.context.unit_of_work(), |unit| {
            self.stage_delete_where::<E>(unit, predicate)
        })?;
        Ok(summary.total())
    }

    pub fn stage_delete_where<E: Entity>(
        &self,
        unit: &mut UnitOfWork<'_>,
        predicate: &Predicate,
    ) -> CrudResult<OperationId> {
        let descriptor = self.context.registry().resolve::<E>()?;
        let sql = format!("DELETE FROM {}", quote_ident(descriptor.table()));
        let query = filtered(sql, descriptor, predicate)?;
        Ok(unit.execute_update(&query)?)
    }

    /// Unbound query for a registered named query.
    pub fn named_query(&self, name: &str) -> CrudResult<Query> {
        let query = self.context.registry().named_query(name)?;
        Ok(query.to_query())
    }

    /// Runs a mutating statement in its own unit of work.
    pub fn execute_update(&self, query: &Query) -> CrudResult<usize> {
        let (_, summary) =
            in_unit_of_work(self.context.unit_of_work(), |unit| unit.execute_update(query))?;
        Ok(summary.total())
    }

    /// Binds `params` by name to a named update and runs it in its own unit.
    pub fn execute_named(&self, name: &str, params: &[(&str, Value)]) -> CrudResult<usize> {
        let query = bind_all(self.named_query(name)?, params);
        self.execute_update(&query)
    }

    pub fn scalar_named<T: FromScalar>(
        &self,
        name: &str,
        params: &[(&str, Value)],
    ) -> CrudResult<T> {
        let query = bind_all(self.named_query(name)?, params);
        self.fetch_scalar(&query)
    }

    pub fn fetch_entities<E: Entity>(&self, query: &Query) -> CrudResult<Vec<E>> {
        Ok(self.executor()?.fetch_entities::<E>(query)?)
    }

    pub fn fetch_projection(&self, query: &Query) -> CrudResult<Rows> {
        Ok(self.executor()?.fetch_projection(query)?)
    }

    pub fn fetch_scalar<T: FromScalar>(&self, query: &Query) -> CrudResult<T> {
        Ok(self.executor()?.fetch_scalar::<T>(query)?)
    }

    fn executor(&self) -> CrudResult<QueryExecutor<'ctx>> {
        Ok(self.context.executor()?)
    }
}

fn column_of(descriptor: &EntityDescriptor, field: &str) -> Result<String, QueryError> {
    descriptor
        .mapping_for_field(field)
        .map(|mapping| quote_ident(&mapping.column))
        .ok_or_else(|| QueryError::UnknownField {
            entity: descriptor.entity().to_string(),
            field: field.to_string(),
        })
}

/// Appends `WHERE <predicate>` and binds its values positionally.
fn filtered(
    sql: String,
    descriptor: &EntityDescriptor,
    predicate: &Predicate,
) -> Result<Query, QueryError> {
    if *predicate == Predicate::All {
        return Ok(Query::native(sql));
    }
    let (condition, values) = predicate.to_sql(descriptor)?;
    Ok(values
        .into_iter()
        .fold(Query::native(format!("{sql} WHERE {condition}")), |query, value| {
            query.bind(value)
        }))
}

fn bind_all(query: Query, params: &[(&str, Value)]) -> Query {
    params
        .iter()
        .fold(query, |query, (name, value)| query.bind_named(name, value.clone()))
}
