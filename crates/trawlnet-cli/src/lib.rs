//! trawlnet-cli
//!
//! An operator-facing command surface over a deployed `trawlnet-daemon`
//! and its store: start the daemon in the foreground, inspect the host
//! registry, and query the file index without standing up the (out of
//! scope) HTTP search frontend.

pub mod commands;
pub mod error;

use clap::{Parser, Subcommand};

pub use error::{CliError, Result};

#[derive(Debug, Parser)]
#[command(name = "trawlnet", version, about = "Operate a trawlnet FTP scanning/indexing daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the scan/index daemon in the foreground.
    Run,
    /// List the current host registry.
    Hosts,
    /// Search the file index.
    Search {
        /// Search terms (conjuncted; case-insensitive, accent-folded).
        terms: Vec<String>,
        /// Restrict the search to specific host IPs (defaults to all online hosts).
        #[arg(long = "host")]
        hosts: Vec<String>,
        /// Maximum number of results to print.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print file-index stats for one host.
    Stats {
        /// Host IPv4 address.
        ip: String,
    },
}
