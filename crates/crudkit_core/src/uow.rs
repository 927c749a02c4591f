//! Unit of work: buffered mutations behind one transaction boundary.
//!
//! # Responsibility
//! - Track the transaction state machine for one logical batch.
//! - Stage persist / merge / remove / update statements without touching
//!   the store.
//! - Flush the whole batch atomically on commit.
//!
//! # Invariants
//! - Nothing reaches the store before `commit()`.
//! - A failed flush leaves no partial effects and ends `RolledBack`.
//! - A committed or rolled-back unit cannot be reused.

use crate::db::{DbError, StoreConnection};
use crate::model::descriptor::ValidationError;
use crate::model::entity::Entity;
use crate::query::{is_read_only, prepare, run_update, PreparedStatement, Query, QueryError};
use crate::registry::{EntityRegistry, RegistryError};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

pub type UowResult<T> = Result<T, UowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a staged operation within its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(usize);

impl OperationId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Persist,
    Merge,
    Remove,
    Update,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persist => "persist",
            Self::Merge => "merge",
            Self::Remove => "remove",
            Self::Update => "update",
        }
    }
}

#[derive(Debug)]
pub enum UowError {
    /// Operation not allowed in the current state.
    IllegalState {
        operation: &'static str,
        state: TransactionState,
    },
    ConnectionClosed,
    Registry(RegistryError),
    Validation {
        entity: String,
        source: ValidationError,
    },
    /// Staging failed before anything was buffered.
    Query(QueryError),
    /// The store rejected the batch; the unit is rolled back.
    Persistence {
        operation: Option<(OperationId, OperationKind)>,
        source: QueryError,
    },
}

impl Display for UowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalState { operation, state } => {
                write!(f, "cannot {operation} a unit of work that is {state}")
            }
            Self::ConnectionClosed => write!(f, "connection is already closed"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Validation { entity, source } => {
                write!(f, "invalid `{entity}` record: {source}")
            }
            Self::Query(err) => write!(f, "{err}"),
            Self::Persistence {
                operation: Some((id, kind)),
                source,
            } => write!(
                f,
                "commit failed at {} operation {id}, rolled back: {source}",
                kind.as_str()
            ),
            Self::Persistence {
                operation: None,
                source,
            } => write!(f, "commit failed, rolled back: {source}"),
        }
    }
}

impl Error for UowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Validation { source, .. } => Some(source),
            Self::Query(err) => Some(err),
            Self::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RegistryError> for UowError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<QueryError> for UowError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

/// Rows affected by each flushed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    affected: Vec<usize>,
}

impl CommitSummary {
    pub fn rows_affected(&self, id: OperationId) -> Option<usize> {
        self.affected.get(id.0).copied()
    }

    pub fn total(&self) -> usize {
        self.affected.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.affected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }
}

#[derive(Debug)]
struct PendingOperation {
    kind: OperationKind,
    entity: String,
    statement: PreparedStatement,
}

/// One transaction boundary over a borrowed connection.
///
/// Created `NotStarted`; call [`UnitOfWork::begin`] before staging.
#[derive(Debug)]
pub struct UnitOfWork<'ctx> {
    connection: &'ctx StoreConnection,
    registry: &'ctx EntityRegistry,
    state: TransactionState,
    pending: Vec<PendingOperation>,
    timeout: Option<Duration>,
    show_sql: bool,
}

impl<'ctx> UnitOfWork<'ctx> {
    pub fn new(connection: &'ctx StoreConnection, registry: &'ctx EntityRegistry) -> Self {
        Self {
            connection,
            registry,
            state: TransactionState::NotStarted,
            pending: Vec::new(),
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

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn begin(&mut self) -> UowResult<()> {
        if self.state != TransactionState::NotStarted {
            return Err(self.illegal("begin"));
        }
        self.connection.handle().map_err(closed)?;
        self.state = TransactionState::Active;
        debug!("event=uow_begin module=uow status=ok");
        Ok(())
    }

    /// Stages an insert of a new record.
    pub fn persist<E: Entity>(&mut self, record: &E) -> UowResult<OperationId> {
        self.stage_record(OperationKind::Persist, record)
    }

    /// Stages an insert-or-overwrite keyed on the primary key.
    pub fn merge<E: Entity>(&mut self, record: &E) -> UowResult<OperationId> {
        self.stage_record(OperationKind::Merge, record)
    }

    pub fn remove<E: Entity>(&mut self, record: &E) -> UowResult<OperationId> {
        self.remove_by_id::<E>(record.id())
    }

    pub fn remove_by_id<E: Entity>(&mut self, id: impl Into<Value>) -> UowResult<OperationId> {
        self.require_active("remove")?;
        let descriptor = self.registry.resolve::<E>()?;
        let query = Query::native(descriptor.delete_by_id_sql()).bind(id);
        let statement = prepare(self.registry, &query)?;
        Ok(self.push(OperationKind::Remove, E::NAME, statement))
    }

    /// Stages a bulk update or delete; its count is in the commit summary.
    ///
    /// # Errors
    /// - `Query` for binding, translation or read-only statements. The store
    ///   compiles the statement to classify it. The unit stays active.
    pub fn execute_update(&mut self, query: &Query) -> UowResult<OperationId> {
        self.require_active("execute_update")?;
        let statement = prepare(self.registry, query)?;
        let conn = self.connection.handle().map_err(closed)?;
        if is_read_only(conn, &statement)? {
            return Err(QueryError::ShapeMismatch(
                "read statements cannot be staged as updates".to_string(),
            )
            .into());
        }
        let entity = statement.entity.clone().unwrap_or_default();
        Ok(self.push(OperationKind::Update, &entity, statement))
    }

    /// Flushes every staged operation in one store transaction.
    ///
    /// # Errors
    /// - `IllegalState` unless active.
    /// - `ConnectionClosed` when the connection was released; the unit ends
    ///   rolled back.
    /// - `Persistence` when the store rejects an operation; nothing is kept
    ///   and the unit ends rolled back.
    pub fn commit(&mut self) -> UowResult<CommitSummary> {
        self.require_active("commit")?;
        let started_at = Instant::now();
        let pending = std::mem::take(&mut self.pending);

        let conn = match self.connection.handle() {
            Ok(conn) => conn,
            Err(err) => {
                self.state = TransactionState::RolledBack;
                return Err(closed(err));
            }
        };

        match self.flush(conn, &pending) {
            Ok(summary) => {
                self.state = TransactionState::Committed;
                info!(
                    "event=uow_commit module=uow status=ok operations={} rows={} duration_ms={}",
                    summary.len(),
                    summary.total(),
                    started_at.elapsed().as_millis()
                );
                Ok(summary)
            }
            Err(err) => {
                self.state = TransactionState::RolledBack;
                error!(
                    "event=uow_commit module=uow status=error operations={} duration_ms={} error_code=commit_failed error={}",
                    pending.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Discards every staged operation.
    pub fn rollback(&mut self) -> UowResult<()> {
        self.require_active("rollback")?;
        let discarded = self.pending.len();
        self.pending.clear();
        self.state = TransactionState::RolledBack;
        self.connection.handle().map_err(closed)?;
        info!(
            "event=uow_rollback module=uow status=ok discarded={}",
            discarded
        );
        Ok(())
    }

    fn flush(
        &self,
        conn: &rusqlite::Connection,
        pending: &[PendingOperation],
    ) -> UowResult<CommitSummary> {
        let persistence = |operation: Option<(OperationId, OperationKind)>, source: QueryError| {
            UowError::Persistence { operation, source }
        };

        let tx = conn
            .unchecked_transaction()
            .map_err(|err| persistence(None, err.into()))?;
        let mut affected = Vec::with_capacity(pending.len());
        for (index, operation) in pending.iter().enumerate() {
            if self.show_sql {
                info!("event=sql module=uow sql={}", operation.statement.sql);
            }
            let rows = run_update(&tx, &operation.statement, self.timeout)
                .map_err(|err| persistence(Some((OperationId(index), operation.kind)), err))?;
            debug!(
                "event=uow_flush module=uow status=ok operation={} kind={} entity={} rows={}",
                index,
                operation.kind.as_str(),
                operation.entity,
                rows
            );
            affected.push(rows);
        }
        tx.commit().map_err(|err| persistence(None, err.into()))?;
        Ok(CommitSummary { affected })
    }

    fn stage_record<E: Entity>(
        &mut self,
        kind: OperationKind,
        record: &E,
    ) -> UowResult<OperationId> {
        self.require_active(kind.as_str())?;
        let descriptor = self.registry.resolve::<E>()?;
        let invalid = |source| UowError::Validation {
            entity: E::NAME.to_string(),
            source,
        };
        record.validate().map_err(invalid)?;
        let values = descriptor
            .ordered_values(record.field_values())
            .map_err(invalid)?;

        let sql = match kind {
            OperationKind::Merge => descriptor.upsert_sql(),
            _ => descriptor.insert_sql(),
        };
        let query = values
            .into_iter()
            .fold(Query::native(sql), |query, value| query.bind(value));
        let statement = prepare(self.registry, &query)?;
        Ok(self.push(kind, E::NAME, statement))
    }

    fn push(
        &mut self,
        kind: OperationKind,
        entity: &str,
        statement: PreparedStatement,
    ) -> OperationId {
        let id = OperationId(self.pending.len());
        self.pending.push(PendingOperation {
            kind,
            entity: entity.to_string(),
            statement,
        });
        id
    }

    fn require_active(&self, operation: &'static str) -> UowResult<()> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(self.illegal(operation))
        }
    }

    fn illegal(&self, operation: &'static str) -> UowError {
        UowError::IllegalState {
            operation,
            state: self.state,
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && !self.pending.is_empty() {
            warn!(
                "event=uow_drop module=uow status=discarded pending={}",
                self.pending.len()
            );
        }
    }
}

fn closed(_: DbError) -> UowError {
    UowError::ConnectionClosed
}

/// Runs `work` inside `unit` and commits it.
///
/// Any error from `work` rolls the unit back before it is returned.
pub fn in_unit_of_work<'ctx, T, E>(
    mut unit: UnitOfWork<'ctx>,
    work: impl FnOnce(&mut UnitOfWork<'ctx>) -> Result<T, E>,
) -> Result<(T, CommitSummary), E>
where
    E: From<UowError>,
{
    unit.begin()?;
    match work(&mut unit) {
        Ok(value) => Ok((value, unit.commit()?)),
        Err(err) => {
            let _ = unit.rollback();
            Err(err)
        }
    }
}
