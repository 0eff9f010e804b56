//! partsync CLI
//!
//! Offline maintenance of a device's durable cache directory.
//!
//! # Commands
//!
//! - `inspect` - Display cached collections and storage usage
//! - `export` - Dump cached snapshots to a JSON backup
//! - `import` - Restore a JSON backup, merging with what is cached
//! - `merge` - Merge two JSON record sets offline
//! - `clear` - Remove cached snapshots

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// partsync cache maintenance tools.
#[derive(Parser)]
#[command(name = "partsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
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
    /// Display cached collections and storage usage
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump cached snapshots to a JSON backup
    Export {
        /// Backup file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Only export this collection
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Restore a JSON backup
    Import {
        /// Backup file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Replace cached snapshots instead of merging
        #[arg(long)]
        force: bool,
    },

    /// Merge two JSON record sets and print the result
    Merge {
        /// Local records (array, id map or envelope)
        local: PathBuf,

        /// Remote records (array, id map or envelope)
        remote: PathBuf,
    },

    /// Remove cached snapshots
    Clear {
        /// Only remove this collection
        #[arg(short, long)]
        key: Option<String>,
    },

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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Cache path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Export { output, key } => {
            let path = cli.path.ok_or("Cache path required for export")?;
            commands::export::run(&path, &output, key.as_deref())?;
        }
        Commands::Import { input, force } => {
            let path = cli.path.ok_or("Cache path required for import")?;
            commands::import::run(&path, &input, force)?;
        }
        Commands::Merge { local, remote } => {
            commands::merge::run(&local, &remote)?;
        }
        Commands::Clear { key } => {
            let path = cli.path.ok_or("Cache path required for clear")?;
            commands::clear::run(&path, key.as_deref())?;
        }
        Commands::Version => {
            println!("partsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
