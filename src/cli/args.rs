//! CLI argument definitions using clap
//!
//! Commands:
//! - raidgroup layout [--config <path>] [--capacity <blocks>]
//! - raidgroup expand [--config <path>] --capacity <blocks> [--fail-at <hook>]
//! - raidgroup verify [--config <path>] --kind <kind> --lba <disk lba> --blocks <n>
//! - raidgroup health [--config <path>] --links <state,...>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Raid group capacity change and background verify simulator
#[derive(Parser, Debug)]
#[command(name = "raidgroup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity written to stderr (trace, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the metadata layout for an exported capacity
    Layout {
        /// Path to configuration file; built-in defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Exported capacity in blocks; the configured one when omitted
        #[arg(long)]
        capacity: Option<u64>,
    },

    /// Run a capacity change across two simulated controllers
    Expand {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Requested exported capacity in blocks, before rounding
        #[arg(long)]
        capacity: u64,

        /// Force the error outcome at this hook point (e.g. config_error_active)
        #[arg(long)]
        fail_at: Option<String>,

        /// Give up if the controllers have not settled after this many ticks
        #[arg(long, default_value_t = 1000)]
        max_ticks: usize,
    },

    /// Mark a range and run verify until the pass completes
    Verify {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Verify kind (incomplete_write, error, system, read_write, read_only)
        #[arg(long, default_value = "read_only")]
        kind: String,

        /// Disk-relative start of the marked range
        #[arg(long, default_value_t = 0)]
        lba: u64,

        /// Disk-relative length of the marked range
        #[arg(long)]
        blocks: u64,

        #[arg(long, default_value_t = 10_000)]
        max_ticks: usize,
    },

    /// Classify group health from per-disk link states
    Health {
        #[arg(long)]
        config: Option<PathBuf>,

        /// One state per disk, comma separated (enabled, disabled, broken, gone, invalid, slumber)
        #[arg(long, value_delimiter = ',')]
        links: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
