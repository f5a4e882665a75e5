//! spendsync CLI
//!
//! Records expenses in a local replica and keeps it in sync with a
//! spendsync server. Every command works offline; sync failures are
//! reported and the changes stay queued.
//!
//! # Commands
//!
//! - `add` - Record a new expense
//! - `edit` - Change fields of an expense
//! - `delete` - Delete an expense
//! - `list` - List visible expenses
//! - `totals` - Sum visible amounts per category
//! - `sync` - Run one sync cycle
//! - `status` - Show replica and sync state
//! - `watch` - Keep syncing in the background until interrupted
//! - `serve` - Run the reference server

mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use spendsync_engine::SyncConfig;
use spendsync_protocol::{Amount, Category};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline-first expense tracker.
#[derive(Parser)]
#[command(name = "spendsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the replica directory
    #[arg(global = true, short, long, env = "SPENDSYNC_DATA", default_value = ".spendsync")]
    path: PathBuf,

    /// Base URL of the sync server
    #[arg(
        global = true,
        short,
        long,
        env = "SPENDSYNC_SERVER",
        default_value = "http://localhost:5000"
    )]
    server: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new expense
    Add {
        /// Amount spent, e.g. 12.50
        amount: Amount,

        /// Category (food, transport, entertainment, shopping, utilities,
        /// health, travel, education, other)
        category: Category,

        /// What the money was spent on
        description: String,

        /// Day of the expense (YYYY-MM-DD), today if omitted
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Do not try to sync afterwards
        #[arg(long)]
        offline: bool,
    },

    /// Change fields of an expense
    Edit {
        /// Expense id as shown by `list`
        id: String,

        /// New amount
        #[arg(long)]
        amount: Option<Amount>,

        /// New category
        #[arg(long)]
        category: Option<Category>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Do not try to sync afterwards
        #[arg(long)]
        offline: bool,
    },

    /// Delete an expense
    Delete {
        /// Expense id as shown by `list`
        id: String,

        /// Do not try to sync afterwards
        #[arg(long)]
        offline: bool,
    },

    /// List visible expenses, newest first
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<Category>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sum visible amounts per category
    Totals {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one sync cycle
    Sync,

    /// Show replica and sync state
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between sync cycles
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Run the reference server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,

        /// Maximum records per push
        #[arg(long, default_value = "500")]
        max_push_batch: usize,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = SyncConfig::new(cli.server.clone());

    match cli.command {
        Commands::Add {
            amount,
            category,
            description,
            date,
            offline,
        } => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::expense::add(&engine, amount, category, description, date)?;
            commands::sync_after_mutation(&engine, offline).await;
        }
        Commands::Edit {
            id,
            amount,
            category,
            description,
            date,
            offline,
        } => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::expense::edit(&engine, &id, amount, category, description, date)?;
            commands::sync_after_mutation(&engine, offline).await;
        }
        Commands::Delete { id, offline } => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::expense::delete(&engine, &id)?;
            commands::sync_after_mutation(&engine, offline).await;
        }
        Commands::List { category, format } => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::list::list(&engine, category, &format)?;
        }
        Commands::Totals { format } => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::list::totals(&engine, &format)?;
        }
        Commands::Sync => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::sync::run(&engine).await?;
        }
        Commands::Status { format } => {
            let engine = commands::open_engine(&cli.path, config)?;
            commands::sync::status(&engine, &format)?;
        }
        Commands::Watch { interval } => {
            let config = config.with_sync_interval(std::time::Duration::from_secs(interval.max(1)));
            let engine = commands::open_engine(&cli.path, config)?;
            commands::sync::watch(engine).await?;
        }
        Commands::Serve {
            bind,
            max_push_batch,
        } => {
            commands::serve::run(bind, max_push_batch).await?;
        }
        Commands::Version => {
            println!("spendsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
