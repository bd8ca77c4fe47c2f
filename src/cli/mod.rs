//! CLI module for raidgroup
//!
//! Provides command-line interface for:
//! - layout: metadata positions for a capacity
//! - expand: a dual-controller capacity change
//! - verify: a background verify pass over a marked range
//! - health: edge health classification

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{expand, health, layout, run, run_command, verify};
pub use config::{Config, VerifyConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
