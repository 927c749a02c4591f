//! Subcommand implementations and shared store bootstrap.

use anyhow::{Context, Result};
use clap::Args;
use crudkit_core::{sample_registry, PersistenceContext, SchemaMode, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub mod connect;
pub mod demo;
pub mod employee;
pub mod product;
pub mod student;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Configuration file holding named persistence units
    #[arg(long, global = true, default_value = "crudkit.toml")]
    pub config: PathBuf,

    /// Persistence unit to load from the configuration file
    #[arg(long, global = true, default_value = "config")]
    pub unit: String,

    /// Use a throwaway in-memory store instead of the configuration file
    #[arg(long, global = true)]
    pub memory: bool,
}

impl StoreArgs {
    pub fn store_config(&self) -> Result<StoreConfig> {
        if self.memory {
            return Ok(StoreConfig::in_memory().with_schema_mode(SchemaMode::Create));
        }
        StoreConfig::load(&self.config, &self.unit).with_context(|| {
            format!(
                "cannot load unit `{}` from `{}`",
                self.unit,
                self.config.display()
            )
        })
    }

    /// Opens the configured unit with every sample record registered.
    pub fn open(&self) -> Result<PersistenceContext> {
        let config = self.store_config()?;
        let registry = sample_registry(config.mappings.clone())
            .context("invalid entity mapping overrides")?;
        let url = config.store_url.clone();
        PersistenceContext::open(config, Arc::new(registry))
            .with_context(|| format!("cannot open store `{url}`"))
    }
}

/// Releases the store connection explicitly so close errors surface.
pub fn finish(mut context: PersistenceContext) -> Result<()> {
    context.close().context("failed to release the store connection")?;
    log::info!("event=cli_finish module=cli status=ok");
    Ok(())
}
