//! Student commands
//!
//! Usage: crudkit student insert

use super::{finish, StoreArgs};
use anyhow::Result;
use clap::{Args, Subcommand};
use crudkit_core::{CrudService, Student};

#[derive(Debug, Args)]
pub struct StudentArgs {
    #[command(subcommand)]
    pub command: StudentCommand,
}

#[derive(Debug, Subcommand)]
pub enum StudentCommand {
    /// Insert the five sample students in one unit of work
    Insert,
}

pub fn execute(store: &StoreArgs, args: StudentArgs) -> Result<()> {
    let context = store.open()?;
    match args.command {
        StudentCommand::Insert => {
            let inserted = CrudService::new(&context).insert_many(&sample_students())?;
            println!("✓ Inserted {} student(s)", inserted);
        }
    }
    finish(context)
}

fn sample_students() -> Vec<Student> {
    vec![
        Student::new(101, "Alice", "CS", "NY", 1_111_111_111),
        Student::new(102, "Bob", "EE", "LA", 2_222_222_222),
        Student::new(103, "Charlie", "ME", "Chi", 3_333_333_333),
        Student::new(104, "Diana", "Phy", "Aus", 4_444_444_444),
        Student::new(105, "Eve", "Chem", "Mia", 5_555_555_555),
    ]
}
