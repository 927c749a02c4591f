//! Core use-case services.
//!
//! # Responsibility
//! - Compose units of work and query execution into caller-level CRUD.
//! - Keep the CLI decoupled from SQL and transaction details.

pub mod crud_service;

pub use crud_service::CrudService;
