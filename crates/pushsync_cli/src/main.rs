//! pushsync CLI
//!
//! Dry-run tools for the push orchestrator.
//!
//! # Commands
//!
//! - `run` - Push against a fixture topology and print the node statuses
//! - `check` - Validate a fixture without running it

mod commands;
mod fixture;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// pushsync command-line tools.
#[derive(Parser)]
#[command(name = "pushsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the topology fixture (JSON)
    #[arg(global = true, short, long)]
    fixture: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push to every target in the fixture
    Run {
        /// Number of nodes pushed concurrently
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Report the last cycle's counts instead of run totals
        #[arg(long)]
        per_cycle: bool,

        /// Timeout for each transport/extract call, in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Registration URL (overrides the fixture)
        #[arg(short, long)]
        registration_url: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = commands::run::OutputFormat::Text)]
        format: commands::run::OutputFormat,
    },

    /// Validate a fixture
    Check,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
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

    match cli.command {
        Commands::Run {
            workers,
            per_cycle,
            timeout,
            registration_url,
            format,
        } => {
            let path = cli.fixture.ok_or("Fixture path required for run")?;
            let options = commands::run::RunOptions {
                workers,
                per_cycle,
                timeout_secs: timeout,
                registration_url,
            };
            commands::run::run(&path, &options, format)?;
        }
        Commands::Check => {
            let path = cli.fixture.ok_or("Fixture path required for check")?;
            commands::check::run(&path)?;
        }
        Commands::Version => {
            println!("pushsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
