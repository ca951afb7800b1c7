//! Command-line interface for Gatehouse.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::{cmd_gen_secret, cmd_init, cmd_setup_status, cmd_users};

/// Gatehouse - session and identity service for a role-gated back office
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API (default)
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Write a config file with freshly generated secrets
    #[command(alias = "--init")]
    Init {
        /// Where to write the config
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Print a random hex secret for token secrets or the setup token
    GenSecret {
        /// Number of random bytes before hex encoding
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },

    /// Show whether first-run setup is still pending
    SetupStatus,

    /// List back-office users
    #[command(alias = "ls")]
    Users,
}
