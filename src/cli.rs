//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Industry - factory floor agent simulation
#[derive(Parser, Debug)]
#[command(name = "industry")]
#[command(version)]
#[command(about = "Simulate a factory floor run by negotiating agents")]
#[command(
    long_about = "Industry runs a scheduler, machine work-cells and transport robots as independent agents that trade orders and goods through request/agree/refuse/inform messages."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the factory
    Run {
        /// TOML configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop emitting orders after this many
        #[arg(short, long)]
        orders: Option<u64>,

        /// Wall-clock run time in seconds
        #[arg(short, long, default_value_t = 60)]
        duration_secs: u64,

        /// Seed for layout, order generation and robot decisions
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// TOML configuration file to merge over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
