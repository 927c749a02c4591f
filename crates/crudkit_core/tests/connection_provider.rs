use crudkit_core::config::ConfigError;
use crudkit_core::{
    sample_registry, ConnectionProvider, DbError, Employee, EntityRegistry, PersistenceContext,
    SchemaMode, StoreConfig,
};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;

fn registry() -> Arc<EntityRegistry> {
    Arc::new(sample_registry(BTreeMap::new()).unwrap())
}

#[test]
fn in_memory_open_creates_every_mapped_table() {
    let provider = ConnectionProvider::new(StoreConfig::in_memory());
    let connection = provider.open(registry()).unwrap();
    let conn = connection.handle().unwrap();

    assert_table_exists(conn, "emp_3");
    assert_table_exists(conn, "student");
    assert_table_exists(conn, "Product_2");
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn close_is_idempotent_and_releases_the_handle() {
    let provider = ConnectionProvider::new(StoreConfig::in_memory());
    let mut connection = provider.open(registry()).unwrap();
    assert!(connection.is_open());

    connection.close().unwrap();
    connection.close().unwrap();

    assert!(!connection.is_open());
    assert!(matches!(connection.handle(), Err(DbError::ConnectionClosed)));
}

#[test]
fn update_mode_keeps_rows_across_reopen_and_create_mode_wipes_them() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let first = PersistenceContext::open(StoreConfig::file(&path), registry()).unwrap();
    let inserted = crudkit_core::CrudService::new(&first)
        .insert_many(&[Employee::new(1, "Asha", "Pune", "Clerk", 9_000_000_001)])
        .unwrap();
    assert_eq!(inserted, 1);
    drop(first);

    let second = PersistenceContext::open(StoreConfig::file(&path), registry()).unwrap();
    assert_eq!(crudkit_core::CrudService::new(&second).count::<Employee>().unwrap(), 1);
    drop(second);

    let recreated = PersistenceContext::open(
        StoreConfig::file(&path).with_schema_mode(SchemaMode::Create),
        registry(),
    )
    .unwrap();
    assert_eq!(crudkit_core::CrudService::new(&recreated).count::<Employee>().unwrap(), 0);
}

#[test]
fn create_drop_removes_tables_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scratch.db");
    let provider =
        ConnectionProvider::new(StoreConfig::file(&path).with_schema_mode(SchemaMode::CreateDrop));

    let mut connection = provider.open(registry()).unwrap();
    assert_table_exists(connection.handle().unwrap(), "emp_3");
    connection.close().unwrap();

    let raw = Connection::open(&path).unwrap();
    assert!(!table_exists(&raw, "emp_3"));
    assert!(!table_exists(&raw, "Product_2"));
}

#[test]
fn validate_mode_reports_missing_tables_and_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    let validate = || {
        ConnectionProvider::new(StoreConfig::file(&path).with_schema_mode(SchemaMode::Validate))
            .open(registry())
    };

    match validate() {
        Err(DbError::MissingTable(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }

    let raw = Connection::open(&path).unwrap();
    raw.execute_batch(
        "CREATE TABLE emp_3 (Emp_ID INTEGER PRIMARY KEY, Emp_Name TEXT, city TEXT, post TEXT);
         CREATE TABLE student (id INTEGER PRIMARY KEY, name TEXT, course TEXT, city TEXT, mobileNo INTEGER);
         CREATE TABLE Product_2 (Product_id INTEGER PRIMARY KEY, name TEXT, manufacturingDate TEXT, price INTEGER);",
    )
    .unwrap();
    drop(raw);

    match validate() {
        Err(DbError::MissingColumn { table, column }) => {
            assert_eq!(table, "emp_3");
            assert_eq!(column, "mobileNo");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn none_mode_issues_no_ddl() {
    let provider =
        ConnectionProvider::new(StoreConfig::in_memory().with_schema_mode(SchemaMode::None));
    let connection = provider.open(registry()).unwrap();
    assert!(!table_exists(connection.handle().unwrap(), "emp_3"));
}

#[test]
fn config_file_errors_are_fatal_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = ConnectionProvider::from_config_file(dir.path().join("none.toml"), "config");
    assert!(matches!(
        missing,
        Err(DbError::Config(ConfigError::Missing(_)))
    ));

    let path = dir.path().join("crudkit.toml");
    std::fs::write(&path, "[units.config]\nstore_url = \"sqlite::memory:\"\n").unwrap();
    let unknown = ConnectionProvider::from_config_file(&path, "other");
    assert!(matches!(
        unknown,
        Err(DbError::Config(ConfigError::UnknownUnit(unit))) if unit == "other"
    ));

    let provider = ConnectionProvider::from_config_file(&path, "config").unwrap();
    assert_eq!(provider.config().unit, "config");
    assert!(provider.open(registry()).unwrap().is_open());
}

fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table_name],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        == 1
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert!(table_exists(conn, table_name), "missing table {table_name}");
}
