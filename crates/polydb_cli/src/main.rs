//! PolyDB CLI
//!
//! Command-line tools for directories of PolyDB NDJSON table files.
//!
//! # Commands
//!
//! - `inspect` - List tables with row counts
//! - `backup` - Write tables to an NDJSON backup directory
//! - `restore` - Load a backup directory into the store
//! - `copy` - Copy tables into another store directory

mod commands;

use clap::{Parser, Subcommand};
use polydb_core::ErrorMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PolyDB command-line tools.
#[derive(Parser)]
#[command(name = "polydb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables with row counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write tables to an NDJSON backup directory
    Backup {
        /// Backup directory
        #[arg(short, long)]
        output: PathBuf,

        /// Tables to back up (default: all)
        #[arg(short, long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Only rows updated at or after this unix timestamp
        #[arg(long)]
        since_updated: Option<i64>,

        /// Write plain .ndjson files
        #[arg(long)]
        no_gzip: bool,

        /// Tables processed at once
        #[arg(short, long, default_value = "16")]
        concurrency: usize,

        /// Write a schema file next to each table
        #[arg(long)]
        emit_schema: bool,

        /// Refuse to overwrite existing files
        #[arg(long)]
        protect: bool,

        /// Error mode (throw-immediately, throw-aggregated, suppress)
        #[arg(long, default_value = "suppress")]
        error_mode: ErrorMode,
    },

    /// Load a backup directory into the store
    Restore {
        /// Backup directory
        #[arg(short, long)]
        input: PathBuf,

        /// Tables to restore (default: all files found)
        #[arg(short, long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Drop and recreate tables from their schema files first
        #[arg(long)]
        recreate_tables: bool,

        /// Rows per save
        #[arg(long, default_value = "100")]
        chunk_size: usize,

        /// Error mode (throw-immediately, throw-aggregated, suppress)
        #[arg(long, default_value = "suppress")]
        error_mode: ErrorMode,
    },

    /// Copy tables into another store directory
    Copy {
        /// Target store directory
        #[arg(long)]
        target: PathBuf,

        /// Tables to copy (default: all)
        #[arg(short, long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Rows per save
        #[arg(long, default_value = "100")]
        chunk_size: usize,

        /// Error mode (throw-immediately, throw-aggregated, suppress)
        #[arg(long, default_value = "suppress")]
        error_mode: ErrorMode,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format).await?;
        }
        Commands::Backup {
            output,
            tables,
            since_updated,
            no_gzip,
            concurrency,
            emit_schema,
            protect,
            error_mode,
        } => {
            let path = cli.path.ok_or("Store path required for backup")?;
            let args = commands::backup::BackupArgs {
                output,
                tables,
                since_updated,
                gzip: !no_gzip,
                concurrency,
                emit_schema,
                protect,
                error_mode,
            };
            commands::backup::create(&path, args).await?;
        }
        Commands::Restore {
            input,
            tables,
            recreate_tables,
            chunk_size,
            error_mode,
        } => {
            let path = cli.path.ok_or("Store path required for restore")?;
            let args = commands::backup::RestoreArgs {
                input,
                tables,
                recreate_tables,
                chunk_size,
                error_mode,
            };
            commands::backup::restore(&path, args).await?;
        }
        Commands::Copy {
            target,
            tables,
            chunk_size,
            error_mode,
        } => {
            let path = cli.path.ok_or("Store path required for copy")?;
            commands::copy::run(&path, &target, tables, chunk_size, error_mode).await?;
        }
        Commands::Version => {
            println!("PolyDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("PolyDB Core v{}", polydb_core::VERSION);
        }
    }

    Ok(())
}
