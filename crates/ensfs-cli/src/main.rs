#![deny(unsafe_code)]

//! `ensfs` - inspect and exercise ensemble case storage from the shell.

mod commands;

use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ensfs_core::ManagerConfig;

use crate::commands::{create, list, mount, rotate, status};

/// Command-line interface for ensemble case storage
#[derive(Parser)]
#[command(name = "ensfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Initialize an ensemble root and register two cases
    ensfs --root ./ens init
    ensfs --root ./ens create base_case
    ensfs --root ./ens create sensitivity_01

    # Mount cases through a bounded cache and watch rotation
    ensfs --root ./ens --capacity 2 mount base_case sensitivity_01 history

    # List registered cases
    ensfs --root ./ens list
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Ensemble root directory
    #[arg(long, default_value = ".", global = true, value_name = "DIR")]
    root: PathBuf,

    /// Mount cache capacity
    #[arg(long, global = true, value_name = "N")]
    capacity: Option<NonZeroUsize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an ensemble root (creates the storage directory)
    Init,
    /// Register a case without mounting it
    Create(create::Args),
    /// List registered cases
    List(list::Args),
    /// Mount cases through the cache and report the resident set
    Mount(mount::Args),
    /// Show registry and cache configuration
    Status(status::Args),
    /// Mount a case, then force one eviction pass
    Rotate(rotate::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ManagerConfig::default();
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }

    match &cli.command {
        Commands::Init => commands::init::execute(&cli.root, &config),
        Commands::Create(args) => create::execute(&cli.root, &config, args),
        Commands::List(args) => list::execute(&cli.root, &config, args),
        Commands::Mount(args) => mount::execute(&cli.root, config, args),
        Commands::Status(args) => status::execute(&cli.root, &config, args),
        Commands::Rotate(args) => rotate::execute(&cli.root, &config, args),
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
