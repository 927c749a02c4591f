//! End-to-end walkthrough over the employee table.
//!
//! Usage: crudkit demo

use super::employee::{print_lookup, sample_employees};
use super::{finish, StoreArgs};
use anyhow::Result;
use crudkit_core::{CrudService, Employee, Predicate};
use std::time::Instant;

pub fn execute(store: &StoreArgs) -> Result<()> {
    let started = Instant::now();
    let context = store.open()?;
    let service = CrudService::new(&context);

    println!("--- insert ---");
    let inserted = service.insert_many(&sample_employees())?;
    println!("✓ Inserted {} employee(s)", inserted);
    println!("Total employees: {}", service.count::<Employee>()?);

    println!("--- read ---");
    print_lookup(&service, 2)?;

    println!("--- update ---");
    let updated = service.update_field::<Employee>(3, "post", "HR".to_string())?;
    println!("✓ Rows updated: {}", updated);
    print_lookup(&service, 3)?;

    println!("--- delete ---");
    let deleted = service.delete_where::<Employee>(&Predicate::eq("id", 3))?;
    println!("✓ Rows deleted: {}", deleted);
    println!("Total employees: {}", service.count::<Employee>()?);
    print_lookup(&service, 3)?;

    log::info!(
        "event=cli_demo module=cli status=ok duration_ms={}",
        started.elapsed().as_millis()
    );
    finish(context)
}
