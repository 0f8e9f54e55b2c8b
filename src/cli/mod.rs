//! CLI module for sbcplane
//!
//! Provides command-line interface for:
//! - serve: Boot the registry, reconcilers and HTTP API
//! - check: Validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{build_reconcilers, check, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
