//! `trawlnet`: operator CLI for a deployed trawlnet daemon.

use clap::Parser;
use trawlnet_cli::{commands, Cli, Command, Result};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run => commands::run::run().await,
        Command::Hosts => commands::hosts::run().await,
        Command::Search { terms, hosts, limit } => commands::search::run(terms, hosts, limit).await,
        Command::Stats { ip } => commands::stats::run(ip).await,
    }
}
