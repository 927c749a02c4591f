//! Connection check
//!
//! Usage: crudkit connect

use super::{finish, StoreArgs};
use anyhow::Result;

/// Open the configured unit, print what was opened, and close it again
pub fn execute(store: &StoreArgs) -> Result<()> {
    let context = store.open()?;
    let config = context.config();
    println!(
        "unit={} store_url={} schema_mode={} tables={}",
        config.unit,
        config.store_url,
        config.schema_mode.as_str(),
        context.registry().len()
    );
    println!("✓ Connection created successfully");
    finish(context)
}
