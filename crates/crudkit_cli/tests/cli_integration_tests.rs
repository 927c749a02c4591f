//! CLI integration tests
//!
//! Each test runs the built binary against a store inside a temp directory.

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_config(dir: &Path, schema_mode: &str) {
    fs::write(
        dir.join("crudkit.toml"),
        format!("[units.config]\nstore_url = \"sqlite://store.db\"\nschema_mode = \"{schema_mode}\"\n"),
    )
    .unwrap();
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_crudkit"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run crudkit")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed. Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn count_rows(dir: &Path, table: &str) -> i64 {
    let conn = Connection::open(dir.join("store.db")).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn demo_runs_the_walkthrough_in_memory() {
    let temp_dir = TempDir::new().unwrap();
    let stdout = stdout_of(&run(temp_dir.path(), &["--memory", "demo"]));

    assert!(stdout.contains("✓ Inserted 5 employee(s)"));
    assert!(stdout.contains("Total employees: 5"));
    assert!(stdout.contains("Jane Smith"));
    assert!(stdout.contains("✓ Rows updated: 1"));
    assert!(stdout.contains("Total employees: 4"));
    assert!(stdout.contains("Employee not found with id 3"));
}

#[test]
fn connect_reports_the_configured_unit() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "update");

    let stdout = stdout_of(&run(temp_dir.path(), &["connect"]));
    assert!(stdout.contains("unit=config"));
    assert!(stdout.contains("schema_mode=update"));
    assert!(stdout.contains("✓ Connection created successfully"));
    assert_eq!(count_rows(temp_dir.path(), "emp_3"), 0);
}

#[test]
fn employee_commands_persist_between_runs() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "update");

    stdout_of(&run(temp_dir.path(), &["employee", "insert"]));
    let read = stdout_of(&run(temp_dir.path(), &["employee", "read", "--id", "4"]));
    assert!(read.contains("Mary Brown"));

    let deleted = stdout_of(&run(temp_dir.path(), &["employee", "delete", "--id", "4"]));
    assert!(deleted.contains("✓ Rows deleted: 1"));
    let missing = stdout_of(&run(temp_dir.path(), &["employee", "read", "--id", "4"]));
    assert!(missing.contains("Employee not found with id 4"));
    assert_eq!(count_rows(temp_dir.path(), "emp_3"), 4);
}

#[test]
fn native_product_flow_updates_and_deletes_by_price() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "update");

    stdout_of(&run(temp_dir.path(), &["product", "native", "insert"]));
    let listed = stdout_of(&run(temp_dir.path(), &["product", "native", "read-all"]));
    assert!(listed.contains("Shampoo"));
    assert!(listed.contains("Brush"));
    assert!(!listed.contains("Soup"));

    let updated = stdout_of(&run(temp_dir.path(), &["product", "native", "update"]));
    assert!(updated.contains("✓ Rows updated: 2"));
    let deleted = stdout_of(&run(temp_dir.path(), &["product", "native", "delete"]));
    assert!(deleted.contains("✓ Rows deleted: 2"));
    assert_eq!(count_rows(temp_dir.path(), "Product_2"), 2);
}

#[test]
fn native_product_flow_follows_column_overrides() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("crudkit.toml"),
        "[units.config]\nstore_url = \"sqlite://store.db\"\n\n\
         [units.config.mappings.Product]\ncolumns = { price = \"unit_price\" }\n",
    )
    .unwrap();

    stdout_of(&run(temp_dir.path(), &["product", "native", "insert"]));
    let updated = stdout_of(&run(temp_dir.path(), &["product", "native", "update"]));
    assert!(updated.contains("✓ Rows updated: 2"));

    let conn = Connection::open(temp_dir.path().join("store.db")).unwrap();
    let repriced: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM Product_2 WHERE unit_price = 100",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(repriced, 2);
}

#[test]
fn employee_update_rejects_values_of_the_wrong_type() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "update");
    stdout_of(&run(temp_dir.path(), &["employee", "insert"]));

    let output = run(
        temp_dir.path(),
        &["employee", "update", "--id", "1", "--field", "mobile_no", "--value", "abc"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expects an integer"));

    let read = stdout_of(&run(temp_dir.path(), &["employee", "read", "--id", "1"]));
    assert!(read.contains("mobileNo=1234567890"));
}

#[test]
fn entity_query_product_flow_uses_named_queries() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "update");

    stdout_of(&run(temp_dir.path(), &["product", "query", "insert"]));
    let projected = stdout_of(&run(temp_dir.path(), &["product", "query", "read"]));
    assert!(projected.contains("Name: Mobile"));
    assert!(!projected.contains("Mechanical Pen"));

    let updated = stdout_of(&run(temp_dir.path(), &["product", "query", "update"]));
    assert!(updated.contains("rows updated: 1"));
    let deleted = stdout_of(&run(temp_dir.path(), &["product", "query", "delete"]));
    assert!(deleted.contains("rows deleted: 1"));
    let counted = stdout_of(&run(temp_dir.path(), &["product", "query", "count"]));
    assert!(counted.contains("Total products: 2"));
}

#[test]
fn missing_config_file_fails_with_context() {
    let temp_dir = TempDir::new().unwrap();
    let output = run(temp_dir.path(), &["connect"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot load unit `config`"));
}

#[test]
fn duplicate_insert_leaves_the_table_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "update");

    stdout_of(&run(temp_dir.path(), &["student", "insert"]));
    let output = run(temp_dir.path(), &["student", "insert"]);
    assert!(!output.status.success());
    assert_eq!(count_rows(temp_dir.path(), "student"), 5);
}
