//! crudkit CLI
//!
//! Replays the sample persistence scenarios against a configured store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::StoreArgs;

#[derive(Debug, Parser)]
#[command(name = "crudkit", version)]
#[command(about = "Typed CRUD and bulk operations over SQLite", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Write rolling log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open the configured store and report the connection
    Connect,
    /// Employee CRUD operations
    Employee(commands::employee::EmployeeArgs),
    /// Student bulk insert
    Student(commands::student::StudentArgs),
    /// Product bulk operations (native SQL or entity queries)
    Product(commands::product::ProductArgs),
    /// Run the five-employee walkthrough end to end
    Demo,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Connect => commands::connect::execute(&cli.store),
        Commands::Employee(args) => commands::employee::execute(&cli.store, args),
        Commands::Student(args) => commands::student::execute(&cli.store, args),
        Commands::Product(args) => commands::product::execute(&cli.store, args),
        Commands::Demo => commands::demo::execute(&cli.store),
    };

    if let Err(e) = result {
        log::error!("event=cli_command module=cli status=error error={:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) -> Result<(), String> {
    let Some(log_dir) = &cli.log_dir else {
        return Ok(());
    };
    let level = match &cli.log_level {
        Some(level) => crudkit_core::parse_level(level)?,
        None => crudkit_core::default_log_level(),
    };
    crudkit_core::init_logging(level, log_dir)
}
