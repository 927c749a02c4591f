//! Record types and their table mappings.
//!
//! # Responsibility
//! - Describe how record types map onto tables and columns.
//! - Provide the sample records replayed by the CLI.
//!
//! # Invariants
//! - A descriptor is immutable once built.
//! - The primary key is always the first mapped column.

pub mod descriptor;
pub mod employee;
pub mod entity;
pub mod product;
pub mod student;

pub use descriptor::{
    ColumnMapping, ColumnType, DescriptorError, EntityDescriptor, ValidationError,
};
pub use employee::Employee;
pub use entity::{Entity, FieldError, FieldValues};
pub use product::Product;
pub use student::Student;
