//! Employee commands
//!
//! Usage: crudkit employee <insert|read|update|delete> [OPTIONS]

use super::{finish, StoreArgs};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use crudkit_core::model::ColumnType;
use crudkit_core::{CrudService, Employee, EntityDescriptor, Predicate, Value};

#[derive(Debug, Args)]
pub struct EmployeeArgs {
    #[command(subcommand)]
    pub command: EmployeeCommand,
}

#[derive(Debug, Subcommand)]
pub enum EmployeeCommand {
    /// Insert the sample employees in one unit of work
    Insert,
    /// Look an employee up by id
    Read {
        #[arg(long, default_value_t = 2)]
        id: i32,
    },
    /// Set one field of an employee
    Update {
        #[arg(long, default_value_t = 3)]
        id: i32,
        #[arg(long, default_value = "post")]
        field: String,
        #[arg(long, default_value = "HR")]
        value: String,
    },
    /// Delete an employee by id
    Delete {
        #[arg(long, default_value_t = 3)]
        id: i32,
    },
}

pub fn execute(store: &StoreArgs, args: EmployeeArgs) -> Result<()> {
    let context = store.open()?;
    let service = CrudService::new(&context);

    match args.command {
        EmployeeCommand::Insert => {
            let inserted = service.insert_many(&sample_employees())?;
            println!("✓ Inserted {} employee(s)", inserted);
        }
        EmployeeCommand::Read { id } => print_lookup(&service, id)?,
        EmployeeCommand::Update { id, field, value } => {
            let descriptor = context.registry().resolve::<Employee>()?;
            let value = field_value(descriptor, &field, &value)?;
            let rows = service.update_field::<Employee>(id, &field, value)?;
            if rows == 0 {
                println!("Employee not found with id {}", id);
            } else {
                println!("✓ Updated `{}` on employee {} (rows={})", field, id, rows);
            }
        }
        EmployeeCommand::Delete { id } => {
            let rows = service.delete_where::<Employee>(&Predicate::eq("id", id))?;
            println!("✓ Rows deleted: {}", rows);
        }
    }
    finish(context)
}

pub(crate) fn sample_employees() -> Vec<Employee> {
    vec![
        Employee::new(1, "John Doe", "New York", "Manager", 1_234_567_890),
        Employee::new(2, "Jane Smith", "Los Angeles", "Developer", 9_876_543_210),
        Employee::new(3, "Peter Jones", "Chicago", "Analyst", 5_551_112_222),
        Employee::new(4, "Mary Brown", "Houston", "HR Specialist", 4_443_332_211),
        Employee::new(5, "David Lee", "Miami", "Designer", 7_778_889_900),
    ]
}

pub(crate) fn print_lookup(service: &CrudService<'_>, id: i32) -> Result<()> {
    match service.find_by_id::<Employee>(id)? {
        Some(employee) => println!("✓ Data retrieved: {}", employee),
        None => println!("Employee not found with id {}", id),
    }
    Ok(())
}

/// Parses `raw` into the storage class of the field's column. Unknown fields
/// pass through as text and are reported by the service.
fn field_value(descriptor: &EntityDescriptor, field: &str, raw: &str) -> Result<Value> {
    let Some(mapping) = descriptor.mapping_for_field(field) else {
        return Ok(Value::Text(raw.to_string()));
    };
    let value = match mapping.column_type {
        ColumnType::Integer => Value::Integer(
            raw.parse()
                .with_context(|| format!("field `{field}` expects an integer, got `{raw}`"))?,
        ),
        ColumnType::Real => Value::Real(
            raw.parse()
                .with_context(|| format!("field `{field}` expects a number, got `{raw}`"))?,
        ),
        ColumnType::Text => Value::Text(raw.to_string()),
        ColumnType::Blob => Value::Blob(raw.as_bytes().to_vec()),
    };
    Ok(value)
}
