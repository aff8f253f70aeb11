//! `trawlnet stats <ip>` — prints `FileIndex.stats(ip)`.

use trawlnet_core::config::Config;
use trawlnet_core::store::SqliteStore;

use crate::{CliError, Result};

pub async fn run(ip: String) -> Result<()> {
    let config = Config::from_env()?;
    let store = SqliteStore::connect(&config.store_path).await?;
    let addr = ip.parse().map_err(|_| CliError::UnknownHost(ip.clone()))?;

    let stats = store.stats(addr).await?;
    println!("{addr}: {} files, {} bytes", stats.file_count, stats.size);
    Ok(())
}
