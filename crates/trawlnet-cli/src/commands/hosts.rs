//! `trawlnet hosts` — lists the current host registry.

use comfy_table::{presets::UTF8_FULL, Table};
use trawlnet_core::config::Config;
use trawlnet_core::store::SqliteStore;

use crate::Result;

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let store = SqliteStore::connect(&config.store_path).await?;
    let mut session = store.open_session().await?;
    let mut hosts: Vec<_> = session.get_hosts().await?.into_values().collect();
    hosts.sort_by_key(|h| h.ip);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "ip", "name", "online", "last_online", "last_indexed", "file_count", "size",
    ]);
    for host in hosts {
        table.add_row(vec![
            host.ip.to_string(),
            host.name,
            host.online.to_string(),
            host.last_online.to_rfc3339(),
            host.last_indexed.map(|dt| dt.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
            host.file_count.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            host.size.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}
