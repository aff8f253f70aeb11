//! trawlnet-daemon: the long-running scan/index process.

use std::sync::Arc;

use anyhow::{Context, Result};
use trawlnet_common::logging::{init_logging, LogConfig};
use trawlnet_core::config::Config;
use trawlnet_core::daemon::Daemon;
use trawlnet_core::signals::watch_for_shutdown;
#[cfg(feature = "sqlite-store")]
use trawlnet_core::store::SqliteStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("trawlnet-daemon".to_string())
        .filter_directives("trawlnet_core=info,trawlnet_common=info".to_string())
        .build();
    let log_config = LogConfig::from_env().unwrap_or(log_config);
    init_logging(&log_config).context("failed to initialize logging")?;

    let config = Config::from_env().context("failed to load configuration")?;
    info!(network = %config.network, port = config.port, "starting trawlnet-daemon");

    #[cfg(feature = "sqlite-store")]
    let store = Arc::new(
        SqliteStore::connect(&config.store_path)
            .await
            .context("failed to open the sqlite store")?,
    );
    #[cfg(feature = "sqlite-store")]
    let (registry, index) = (store.clone(), store.clone());

    let soft_signals = config.soft_signals.clone();
    let daemon = Daemon::new(config, registry, index);
    let shutdown = daemon.shutdown_handle();

    tokio::select! {
        () = daemon.run() => {},
        () = watch_for_shutdown(&soft_signals, shutdown) => {},
    }

    info!("trawlnet-daemon stopped");
    Ok(())
}
