//! Product bulk commands
//!
//! Usage:
//!   crudkit product native <insert|read-all|read|update|delete> [OPTIONS]
//!   crudkit product query <insert|read-all|read|update|delete|count> [OPTIONS]

use super::{finish, StoreArgs};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use crudkit_core::model::descriptor::quote_ident;
use crudkit_core::model::product::{COUNT_PRODUCTS, DELETE_BY_NAME, UPDATE_PRICE_BY_ID};
use crudkit_core::{CrudService, EntityDescriptor, PersistenceContext, Product, Query, Value};

#[derive(Debug, Args)]
pub struct ProductArgs {
    #[command(subcommand)]
    pub command: ProductCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Operations written as native SQL against the mapped table
    #[command(subcommand)]
    Native(NativeCommand),
    /// Operations written in the entity query language
    #[command(subcommand)]
    Query(EntityCommand),
}

#[derive(Debug, Subcommand)]
pub enum NativeCommand {
    /// Insert the sample products with one statement per row
    Insert,
    /// Read whole products priced above a threshold
    ReadAll {
        #[arg(long, default_value_t = 40)]
        min_price: i64,
    },
    /// Read id, name and price of products priced above a threshold
    Read {
        #[arg(long, default_value_t = 40)]
        min_price: i64,
    },
    /// Set a new price on the listed product ids
    Update {
        #[arg(long, default_value_t = 100)]
        price: i64,
        #[arg(long, value_delimiter = ',', default_values_t = [102, 104])]
        ids: Vec<i64>,
    },
    /// Delete products with the given price
    Delete {
        #[arg(long, default_value_t = 100)]
        price: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    /// Persist the sample products
    Insert,
    /// Read whole products priced above a threshold
    ReadAll {
        #[arg(long, default_value_t = 100)]
        min: i64,
    },
    /// Read id and name of products priced above a threshold
    Read {
        #[arg(long, default_value_t = 100)]
        min: i64,
    },
    /// Set the price of one product through a named query
    Update {
        #[arg(long, default_value_t = 103)]
        id: i64,
        #[arg(long, default_value_t = 25)]
        price: i64,
    },
    /// Delete products by name through a named query
    Delete {
        #[arg(long, default_value = "Wooden Desk")]
        name: String,
    },
    /// Count every product through a named query
    Count,
}

pub fn execute(store: &StoreArgs, args: ProductArgs) -> Result<()> {
    let context = store.open()?;
    match args.command {
        ProductCommand::Native(command) => execute_native(&context, command)?,
        ProductCommand::Query(command) => execute_entity(&context, command)?,
    }
    finish(context)
}

fn execute_native(context: &PersistenceContext, command: NativeCommand) -> Result<()> {
    let service = CrudService::new(context);
    // Native SQL still names the mapped table and columns, so overrides apply.
    let descriptor = context.registry().resolve::<Product>()?;
    let table = quote_ident(descriptor.table());
    let id = column(descriptor, "id")?;
    let price = column(descriptor, "price")?;

    match command {
        NativeCommand::Insert => {
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES (?, ?, ?, ?)",
                descriptor.column_list()
            );
            let rows = [
                (101, "Soup", "2022-11-22", 20),
                (102, "Shampoo", "2023-02-10", 55),
                (103, "Brush", "2023-04-18", 75),
                (104, "Pen", "2023-06-12", 25),
            ];
            let mut unit = context.unit_of_work();
            unit.begin()?;
            for (id, name, date, price) in rows {
                let insert = Query::native(sql.as_str())
                    .bind(id)
                    .bind_text(name)
                    .bind_text(date)
                    .bind(price);
                unit.execute_update(&insert)?;
            }
            let summary = unit.commit()?;
            println!("✓ Products inserted successfully (rows={})", summary.total());
        }
        NativeCommand::ReadAll { min_price } => {
            let query = Query::native(format!("{} WHERE {price} > ?", descriptor.select_sql()))
                .bind(min_price);
            for product in service.fetch_entities::<Product>(&query)? {
                println!("{}", product);
            }
        }
        NativeCommand::Read { min_price } => {
            let name = column(descriptor, "name")?;
            let query = Query::native(format!(
                "SELECT {id}, {name}, {price} FROM {table} WHERE {price} > ?"
            ))
            .bind(min_price);
            for row in service.fetch_projection(&query)?.iter() {
                println!(
                    "ID: {}, Name: {}, Price: {}",
                    render(&row[0]),
                    render(&row[1]),
                    render(&row[2])
                );
            }
        }
        NativeCommand::Update { price: new_price, ids } => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let query = ids.into_iter().fold(
                Query::native(format!(
                    "UPDATE {table} SET {price} = ? WHERE {id} IN ({placeholders})"
                ))
                .bind(new_price),
                |query, id| query.bind(id),
            );
            println!("✓ Rows updated: {}", service.execute_update(&query)?);
        }
        NativeCommand::Delete { price: target } => {
            let query =
                Query::native(format!("DELETE FROM {table} WHERE {price} = ?")).bind(target);
            println!("✓ Rows deleted: {}", service.execute_update(&query)?);
        }
    }
    Ok(())
}

fn execute_entity(context: &PersistenceContext, command: EntityCommand) -> Result<()> {
    let service = CrudService::new(context);

    match command {
        EntityCommand::Insert => {
            let inserted = service.insert_many(&[
                Product::new(101, "Mobile", "11-11-2022", 20000),
                Product::new(102, "Wooden Desk", "21-02-2022", 7000),
                Product::new(103, "Mechanical Pen", "01-08-2022", 20),
            ])?;
            println!("✓ Inserted {} product(s)", inserted);
        }
        EntityCommand::ReadAll { min } => {
            let query = Query::entity("SELECT p FROM Product p WHERE p.price > :min")
                .bind_named("min", min);
            for product in service.fetch_entities::<Product>(&query)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    product.id, product.name, product.manufacturing_date, product.price
                );
            }
        }
        EntityCommand::Read { min } => {
            let query = Query::entity("SELECT p.id, p.name FROM Product p WHERE p.price > :min")
                .bind_named("min", min);
            for row in service.fetch_projection(&query)?.iter() {
                println!("ID: {}\tName: {}", render(&row[0]), render(&row[1]));
            }
        }
        EntityCommand::Update { id, price } => {
            let rows = service.execute_named(
                UPDATE_PRICE_BY_ID,
                &[("price", Value::Integer(price)), ("id", Value::Integer(id))],
            )?;
            println!("✓ Update successful (rows updated: {})", rows);
        }
        EntityCommand::Delete { name } => {
            let rows = service.execute_named(DELETE_BY_NAME, &[("name", Value::Text(name))])?;
            println!("✓ Delete successful (rows deleted: {})", rows);
        }
        EntityCommand::Count => {
            let total: i64 = service.scalar_named(COUNT_PRODUCTS, &[])?;
            println!("Total products: {}", total);
        }
    }
    Ok(())
}

fn column(descriptor: &EntityDescriptor, field: &str) -> Result<String> {
    descriptor
        .mapping_for_field(field)
        .map(|mapping| quote_ident(&mapping.column))
        .with_context(|| format!("entity `{}` maps no field `{field}`", descriptor.entity()))
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => value.clone(),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}
