//! CLI argument definitions using clap
//!
//! Commands:
//! - sbcplane serve --config <path>
//! - sbcplane check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sbcplane - control plane for a clustered session border controller
#[derive(Parser, Debug)]
#[command(name = "sbcplane")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry API and the reconcilers until interrupted
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./sbcplane.json")]
        config: PathBuf,
    },

    /// Validate a configuration file and print what it resolves to
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./sbcplane.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
