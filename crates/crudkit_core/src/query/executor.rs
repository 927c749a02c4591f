//! Statement preparation, strict binding and row materialization.
//!
//! # Responsibility
//! - Turn a [`Query`] into store SQL plus checked parameters.
//! - Run read statements and shape their rows.
//! - Run mutating statements for the unit of work.
//!
//! # Invariants
//! - Binding is checked against the statement's placeholders before the
//!   store sees the statement.
//! - Reads never mutate; mutating statements only run through a unit of work.
//!   The store's own read-only verdict for the compiled statement decides.

use super::lexer::{placeholders, tokenize, PlaceholderSet, Token, TokenKind};
use super::translate::translate;
use super::{
    FromScalar, ParameterBindingError, Query, QueryError, QueryLanguage, QueryResult,
    ResultShape,
};
use crate::model::descriptor::{quote_ident, EntityDescriptor};
use crate::model::entity::{Entity, FieldValues};
use crate::registry::EntityRegistry;
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Leading keywords a read statement may start with.
const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES"];

/// Virtual machine instructions between timeout checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Parameters in the form the store binds them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BoundParams {
    /// Values for indexes `1..=n`.
    Positional(Vec<Value>),
    /// `(":name", value)` pairs in first-appearance order.
    Named(Vec<(String, Value)>),
}

/// Store-ready statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedStatement {
    pub sql: String,
    pub params: BoundParams,
    /// Entity addressed by an entity-language statement.
    pub entity: Option<String>,
    /// Leading keyword is one of [`READ_KEYWORDS`]. Not sufficient on its
    /// own: `WITH ... DELETE` also qualifies.
    pub leads_with_read: bool,
}

/// Translates and checks `query` without touching the store.
///
/// # Errors
/// - `Syntax` for malformed text or unsupported entity-language forms.
/// - `ParameterBinding` when bound values do not match the placeholders.
/// - `Registry` / `UnknownField` for unmapped entities and fields.
pub(crate) fn prepare(
    registry: &EntityRegistry,
    query: &Query,
) -> QueryResult<PreparedStatement> {
    let tokens = tokenize(query.text()).map_err(QueryError::Syntax)?;
    let leads_with_read = leading_keyword(&tokens)
        .is_some_and(|keyword| READ_KEYWORDS.iter().any(|read| keyword.is_keyword(read)));

    let (sql, entity) = match query.language() {
        QueryLanguage::Native => (query.text().to_string(), None),
        QueryLanguage::Entity => {
            let translation = translate(&tokens, registry)?;
            (translation.sql, Some(translation.entity))
        }
    };

    let layout = placeholders(&tokens)?;
    let params = check_bindings(&layout, query)?;
    Ok(PreparedStatement {
        sql,
        params,
        entity,
        leads_with_read,
    })
}

fn leading_keyword<'t, 'a>(tokens: &'t [Token<'a>]) -> Option<&'t Token<'a>> {
    tokens
        .iter()
        .find(|token| !token.is_trivia() && !token.is_symbol("("))
        .filter(|token| token.kind == TokenKind::Ident)
}

fn check_bindings(layout: &PlaceholderSet, query: &Query) -> QueryResult<BoundParams> {
    let positional = query.positional();
    let named = query.named();

    match layout {
        PlaceholderSet::None => {
            let actual = positional.len() + named.len();
            if actual != 0 {
                return Err(ParameterBindingError::CountMismatch {
                    expected: 0,
                    actual,
                }
                .into());
            }
            Ok(BoundParams::Positional(Vec::new()))
        }
        PlaceholderSet::Positional { count } => {
            if !named.is_empty() {
                return Err(ParameterBindingError::StyleMismatch {
                    expected: "positional",
                }
                .into());
            }
            if positional.len() != *count {
                return Err(ParameterBindingError::CountMismatch {
                    expected: *count,
                    actual: positional.len(),
                }
                .into());
            }
            Ok(BoundParams::Positional(positional.to_vec()))
        }
        PlaceholderSet::Named(names) => {
            if !positional.is_empty() {
                return Err(ParameterBindingError::StyleMismatch { expected: "named" }.into());
            }
            let mut seen = BTreeSet::new();
            for (name, _) in named {
                if !seen.insert(name.as_str()) {
                    return Err(ParameterBindingError::DuplicateNamed(name.clone()).into());
                }
                if !names.contains(name) {
                    return Err(ParameterBindingError::UnexpectedNamed(name.clone()).into());
                }
            }
            names
                .iter()
                .map(|name| {
                    named
                        .iter()
                        .find(|(bound, _)| bound == name)
                        .map(|(_, value)| (format!(":{name}"), value.clone()))
                        .ok_or_else(|| {
                            QueryError::from(ParameterBindingError::MissingNamed(name.clone()))
                        })
                })
                .collect::<QueryResult<Vec<_>>>()
                .map(BoundParams::Named)
        }
    }
}

/// Interrupts the connection once `limit` has elapsed; disarms on drop.
struct TimeoutGuard<'c> {
    conn: &'c Connection,
    armed: bool,
}

impl<'c> TimeoutGuard<'c> {
    fn arm(conn: &'c Connection, limit: Option<Duration>) -> Self {
        let Some(limit) = limit else {
            return Self { conn, armed: false };
        };
        let deadline = Instant::now() + limit;
        conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
        Self { conn, armed: true }
    }
}

impl Drop for TimeoutGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}

fn map_store_error(err: rusqlite::Error, timeout: Option<Duration>) -> QueryError {
    match (&err, timeout) {
        (rusqlite::Error::SqliteFailure(failure, _), Some(limit))
            if failure.code == ErrorCode::OperationInterrupted =>
        {
            warn!(
                "event=query_timeout module=query status=error timeout_ms={}",
                limit.as_millis()
            );
            QueryError::Timeout(limit)
        }
        _ => err.into(),
    }
}

fn bind(stmt: &mut rusqlite::Statement<'_>, params: &BoundParams) -> QueryResult<()> {
    match params {
        BoundParams::Positional(values) => {
            for (index, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(index + 1, value)?;
            }
        }
        BoundParams::Named(values) => {
            for (name, value) in values {
                let index = stmt.parameter_index(name)?.ok_or_else(|| {
                    let bare = name.trim_start_matches(':');
                    ParameterBindingError::UnexpectedNamed(bare.to_string())
                })?;
                stmt.raw_bind_parameter(index, value)?;
            }
        }
    }
    Ok(())
}

/// Asks the store whether the compiled statement leaves the database unchanged.
pub(crate) fn is_read_only(
    conn: &Connection,
    statement: &PreparedStatement,
) -> QueryResult<bool> {
    Ok(conn.prepare(&statement.sql)?.readonly())
}

/// Runs a mutating statement and returns the rows it changed.
pub(crate) fn run_update(
    conn: &Connection,
    statement: &PreparedStatement,
    timeout: Option<Duration>,
) -> QueryResult<usize> {
    let _guard = TimeoutGuard::arm(conn, timeout);
    let store_error = |err: rusqlite::Error| map_store_error(err, timeout);
    let mut stmt = conn.prepare(&statement.sql).map_err(store_error)?;
    bind(&mut stmt, &statement.params)?;
    stmt.raw_execute().map_err(store_error)
}

fn run_read(
    conn: &Connection,
    statement: &PreparedStatement,
    timeout: Option<Duration>,
) -> QueryResult<Rows> {
    let _guard = TimeoutGuard::arm(conn, timeout);
    let store_error = |err: rusqlite::Error| map_store_error(err, timeout);
    let mut stmt = conn.prepare(&statement.sql).map_err(store_error)?;
    if !stmt.readonly() {
        return Err(QueryError::ShapeMismatch(
            "statement writes to the store; stage it in a unit of work".to_string(),
        ));
    }
    bind(&mut stmt, &statement.params)?;

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.raw_query();
    while let Some(row) = cursor.next().map_err(store_error)? {
        let values = (0..width)
            .map(|index| row.get::<_, Value>(index))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_error)?;
        rows.push(values);
    }
    Ok(Rows { columns, rows })
}

/// Ordered heterogeneous tuples with their column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Outcome of [`QueryExecutor::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    /// Rows of an entity or projection query.
    Rows(Rows),
    Scalar(Value),
}

/// Read-side executor over one open connection.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'a> {
    conn: &'a Connection,
    registry: &'a EntityRegistry,
    timeout: Option<Duration>,
    show_sql: bool,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(conn: &'a Connection, registry: &'a EntityRegistry) -> Self {
        Self {
            conn,
            registry,
            timeout: None,
            show_sql: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    /// Unbound query for a registered named query.
    pub fn named(&self, name: &str) -> QueryResult<Query> {
        Ok(self.registry.named_query(name)?.to_query())
    }

    /// Runs a read query according to its declared result shape.
    ///
    /// `Update` shaped queries are rejected; they run through a unit of work.
    pub fn execute(&self, query: &Query) -> QueryResult<ResultSet> {
        match query.shape() {
            ResultShape::Entity(entity) => {
                let descriptor = self.registry.resolve_name(entity)?;
                let rows = self.read(query)?;
                check_entity_columns(descriptor, &rows.columns)?;
                Ok(ResultSet::Rows(rows))
            }
            ResultShape::Projection => self.read(query).map(ResultSet::Rows),
            ResultShape::Scalar => self
                .read(query)
                .and_then(single_value)
                .map(ResultSet::Scalar),
            ResultShape::Update => Err(QueryError::ShapeMismatch(
                "update statements run inside a unit of work".to_string(),
            )),
        }
    }

    /// Materializes every row as a record of `E`.
    ///
    /// # Errors
    /// - `ShapeMismatch` unless the selected columns are exactly `E`'s columns.
    pub fn fetch_entities<E: Entity>(&self, query: &Query) -> QueryResult<Vec<E>> {
        let descriptor = self.registry.resolve::<E>()?;
        let rows = self.read(query)?;
        materialize(descriptor, rows)
    }

    pub fn fetch_projection(&self, query: &Query) -> QueryResult<Rows> {
        self.read(query)
    }

    /// Single value coerced to `T`.
    ///
    /// # Errors
    /// - `NoResult` for zero rows, `NonUniqueResult` for more than one value.
    /// - `TypeCoercion` when the value does not fit `T`.
    pub fn fetch_scalar<T: FromScalar>(&self, query: &Query) -> QueryResult<T> {
        let value = self.read(query).and_then(single_value)?;
        Ok(T::coerce(&value)?)
    }

    /// Looks a record up by primary key. Absence is `Ok(None)`.
    pub fn find<E: Entity>(&self, id: impl Into<Value>) -> QueryResult<Option<E>> {
        let descriptor = self.registry.resolve::<E>()?;
        let query = Query::native(format!(
            "{} WHERE {} = ?",
            descriptor.select_sql(),
            quote_ident(&descriptor.primary_key().column)
        ))
        .bind(id);
        let mut records = self.fetch_entities::<E>(&query)?;
        match records.len() {
            0 | 1 => Ok(records.pop()),
            rows => Err(QueryError::NonUniqueResult {
                rows,
                columns: descriptor.columns().len(),
            }),
        }
    }

    pub fn find_all<E: Entity>(&self) -> QueryResult<Vec<E>> {
        let descriptor = self.registry.resolve::<E>()?;
        self.fetch_entities(&Query::native(descriptor.select_sql()))
    }

    fn read(&self, query: &Query) -> QueryResult<Rows> {
        let statement = prepare(self.registry, query)?;
        if !statement.leads_with_read {
            return Err(QueryError::ShapeMismatch(
                "mutating statements run inside a unit of work".to_string(),
            ));
        }
        if self.show_sql {
            info!("event=sql module=query sql={}", statement.sql);
        }
        let started_at = Instant::now();
        let rows = run_read(self.conn, &statement, self.timeout)?;
        debug!(
            "event=query_read module=query status=ok rows={} columns={} duration_ms={}",
            rows.len(),
            rows.columns.len(),
            started_at.elapsed().as_millis()
        );
        Ok(rows)
    }
}

fn single_value(rows: Rows) -> QueryResult<Value> {
    let columns = rows.columns.len();
    let mut rows = rows.rows;
    match (rows.len(), columns) {
        (0, _) => Err(QueryError::NoResult),
        (1, 1) => Ok(rows.pop().and_then(|row| row.into_iter().next()).unwrap_or(Value::Null)),
        (rows, columns) => Err(QueryError::NonUniqueResult { rows, columns }),
    }
}

fn check_entity_columns(descriptor: &EntityDescriptor, columns: &[String]) -> QueryResult<()> {
    for column in columns {
        if descriptor.mapping_for_column(column).is_none() {
            return Err(QueryError::ShapeMismatch(format!(
                "column `{column}` is not mapped by entity `{}`",
                descriptor.entity()
            )));
        }
    }
    for mapping in descriptor.columns() {
        if !columns
            .iter()
            .any(|column| column.eq_ignore_ascii_case(&mapping.column))
        {
            return Err(QueryError::ShapeMismatch(format!(
                "entity `{}` needs column `{}`",
                descriptor.entity(),
                mapping.column
            )));
        }
    }
    Ok(())
}

fn materialize<E: Entity>(descriptor: &EntityDescriptor, rows: Rows) -> QueryResult<Vec<E>> {
    check_entity_columns(descriptor, &rows.columns)?;
    let Rows { columns, rows } = rows;
    rows.into_iter()
        .map(|row| {
            let fields = FieldValues::from_row(descriptor, &columns, row);
            E::from_fields(&fields).map_err(QueryError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{check_bindings, is_read_only, prepare, BoundParams};
    use crate::model::Product;
    use crate::query::lexer::{placeholders, tokenize};
    use crate::query::{ParameterBindingError, Query, QueryError};
    use crate::registry::EntityRegistry;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    fn binding_error(query: Query) -> ParameterBindingError {
        let tokens = tokenize(query.text()).unwrap();
        let layout = placeholders(&tokens).unwrap();
        match check_bindings(&layout, &query) {
            Err(QueryError::ParameterBinding(err)) => err,
            other => panic!("expected binding error, got {other:?}"),
        }
    }

    #[test]
    fn positional_bindings_must_match_count_and_style() {
        assert_eq!(
            binding_error(Query::native("SELECT ?1, ?3").bind(1)),
            ParameterBindingError::CountMismatch {
                expected: 3,
                actual: 1
            }
        );
        assert_eq!(
            binding_error(Query::native("SELECT ?").bind_named("a", 1)),
            ParameterBindingError::StyleMismatch {
                expected: "positional"
            }
        );
        assert_eq!(
            binding_error(Query::native("SELECT 1").bind(1)),
            ParameterBindingError::CountMismatch {
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn named_bindings_must_match_name_set() {
        let text = "UPDATE t SET a = :a WHERE b = :b";
        assert_eq!(
            binding_error(Query::native(text).bind_named("a", 1)),
            ParameterBindingError::MissingNamed("b".to_string())
        );
        assert_eq!(
            binding_error(
                Query::native(text)
                    .bind_named("a", 1)
                    .bind_named("b", 2)
                    .bind_named("c", 3)
            ),
            ParameterBindingError::UnexpectedNamed("c".to_string())
        );
        assert_eq!(
            binding_error(Query::native(text).bind_named("a", 1).bind_named(":a", 2)),
            ParameterBindingError::DuplicateNamed("a".to_string())
        );
        assert_eq!(
            binding_error(Query::native(text).bind(1).bind(2)),
            ParameterBindingError::StyleMismatch { expected: "named" }
        );
    }

    #[test]
    fn prepare_orders_named_values_by_appearance() {
        let registry = EntityRegistry::builder()
            .register::<Product>()
            .unwrap()
            .build();
        let statement = prepare(
            &registry,
            &Query::entity("UPDATE Product p SET p.price = :price WHERE p.id = :id")
                .bind_named("id", 7)
                .bind_named("price", 250),
        )
        .unwrap();
        assert_eq!(statement.entity.as_deref(), Some("Product"));
        assert!(!statement.leads_with_read);
        assert_eq!(
            statement.params,
            BoundParams::Named(vec![
                (":price".to_string(), Value::Integer(250)),
                (":id".to_string(), Value::Integer(7)),
            ])
        );
    }

    #[test]
    fn leading_read_keywords_are_detected() {
        let registry = EntityRegistry::builder().build();
        let read = prepare(&registry, &Query::native("  -- c\n SELECT 1")).unwrap();
        assert!(read.leads_with_read);
        let write = prepare(&registry, &Query::native("DELETE FROM t")).unwrap();
        assert!(!write.leads_with_read);
    }

    #[test]
    fn store_decides_whether_a_statement_writes() {
        let registry = EntityRegistry::builder().build();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();

        let cte_delete = prepare(
            &registry,
            &Query::native(
                "WITH doomed AS (SELECT 1) DELETE FROM t WHERE id IN (SELECT * FROM doomed)",
            ),
        )
        .unwrap();
        assert!(cte_delete.leads_with_read);
        assert!(!is_read_only(&conn, &cte_delete).unwrap());

        let cte_select =
            prepare(&registry, &Query::native("WITH n AS (SELECT 1) SELECT * FROM n")).unwrap();
        assert!(is_read_only(&conn, &cte_select).unwrap());
    }
}
