//! `trawlnet run` — starts the daemon in the foreground.
//!
//! Shares the same `Config::from_env()` + `init_logging` startup path as
//! the standalone `trawlnet-daemon` binary; this subcommand exists for
//! symmetry with `hosts`/`search`/`stats` rather than as a distinct
//! implementation.

use std::sync::Arc;

use trawlnet_common::logging::{init_logging, LogConfig};
use trawlnet_core::config::Config;
use trawlnet_core::daemon::Daemon;
use trawlnet_core::signals::watch_for_shutdown;
use trawlnet_core::store::SqliteStore;
use tracing::info;

use crate::Result;

pub async fn run() -> Result<()> {
    let log_config = LogConfig::from_env().unwrap_or_else(|_| {
        LogConfig::builder().log_file_prefix("trawlnet".to_string()).build()
    });
    init_logging(&log_config).map_err(anyhow::Error::from)?;

    let config = Config::from_env()?;
    info!(network = %config.network, "starting trawlnet daemon from the CLI");

    let store = Arc::new(SqliteStore::connect(&config.store_path).await?);
    let soft_signals = config.soft_signals.clone();
    let daemon = Daemon::new(config, store.clone(), store);
    let shutdown = daemon.shutdown_handle();

    tokio::select! {
        () = daemon.run() => {},
        () = watch_for_shutdown(&soft_signals, shutdown) => {},
    }

    Ok(())
}
