//! `trawlnet search <terms>` — queries the file index, printing
//! `ftp://host/path/name (size)` lines (§10.4).

use std::collections::HashSet;
use std::net::Ipv4Addr;

use trawlnet_core::config::Config;
use trawlnet_core::store::SqliteStore;

use crate::{CliError, Result};

pub async fn run(terms: Vec<String>, hosts: Vec<String>, limit: usize) -> Result<()> {
    let config = Config::from_env()?;
    let store = SqliteStore::connect(&config.store_path).await?;

    let host_filter: HashSet<Ipv4Addr> = if hosts.is_empty() {
        let mut session = store.open_session().await?;
        session.get_hosts().await?.into_values().filter(|h| h.online).map(|h| h.ip).collect()
    } else {
        hosts
            .iter()
            .map(|s| s.parse::<Ipv4Addr>().map_err(|_| CliError::UnknownHost(s.clone())))
            .collect::<Result<_>>()?
    };

    let hits = store.search(&terms, &host_filter, limit).await?;
    for hit in hits {
        println!("ftp://{}/{}/{} ({} bytes)", hit.host, hit.path, hit.name, hit.size);
    }
    Ok(())
}
