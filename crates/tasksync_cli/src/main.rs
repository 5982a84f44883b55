//! tasksync CLI
//!
//! Drives the sync engine against an in-process service.
//!
//! # Commands
//!
//! - `scenario` - Run the two-device last-writer-wins scenario
//! - `coalesce` - Fire a burst of change notices at a scheduler
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// tasksync sync simulations.
#[derive(Parser)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the two-device conflict scenario and print both devices' state
    Scenario,

    /// Fire change notices at a scheduler and count the passes it runs
    Coalesce {
        /// Number of notices to send
        #[arg(short, long, default_value = "10")]
        notices: u32,

        /// Window the notices are spread over, in milliseconds
        #[arg(short, long, default_value = "200")]
        window_ms: u64,

        /// Minimum interval between passes, in milliseconds
        #[arg(short, long, default_value = "2000")]
        min_interval_ms: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose.
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scenario => {
            commands::scenario::run(&cli.format).await?;
        }
        Commands::Coalesce {
            notices,
            window_ms,
            min_interval_ms,
        } => {
            commands::coalesce::run(notices, window_ms, min_interval_ms, &cli.format).await?;
        }
        Commands::Version => {
            println!("tasksync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("tasksync core v{}", tasksync_core::VERSION);
        }
    }

    Ok(())
}
