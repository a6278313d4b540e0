//! MergeDB CLI
//!
//! Command-line tools for MergeDB database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display manifest, engine and replication log counters
//! - `dump-binlog` - Print replication log entries
//! - `repair-binlog` - Remove entries retention left behind
//! - `compact` - Resolve pending merges and rewrite the journal

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MergeDB command-line database tools.
#[derive(Parser)]
#[command(name = "mergedb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
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
    /// Display database statistics and metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print replication log entries
    DumpBinlog {
        /// First sequence to print; earlier sequences are skipped
        #[arg(short, long, default_value = "0")]
        start: u64,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Binlog capacity the application runs with
        #[arg(short, long)]
        capacity: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete replication log entries below the retained window
    RepairBinlog {
        /// Binlog capacity the application runs with; entries below the
        /// window it implies are removed
        #[arg(long)]
        capacity: Option<u64>,

        /// Also rewrite superseded entries as no-ops
        #[arg(short, long)]
        collapse: bool,
    },

    /// Resolve pending merges and rewrite the journal
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::DumpBinlog {
            start,
            limit,
            capacity,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump-binlog")?;
            commands::dump_binlog::run(&path, start, limit, capacity, &format)?;
        }
        Commands::RepairBinlog { capacity, collapse } => {
            let path = cli.path.ok_or("Database path required for repair-binlog")?;
            commands::repair_binlog::run(&path, capacity, collapse)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Database path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("MergeDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("MergeDB Core v{}", mergedb_core::VERSION);
        }
    }

    Ok(())
}
