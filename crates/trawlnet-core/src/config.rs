//! Daemon configuration, loaded from the environment (see §6.3 / §10.3).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 21;
pub const DEFAULT_USER: &str = "anonymous";
pub const DEFAULT_PASSWD: &str = "trawlnet@example.com";
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_SCAN_TASKS: usize = 256;
pub const DEFAULT_OFFLINE_DELAY_SECS: u64 = 7 * 24 * 3600;
pub const DEFAULT_INDEX_INTERVAL_SECS: u64 = 24 * 3600;
pub const DEFAULT_INDEX_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_INDEX_TASKS: usize = 4;
pub const DEFAULT_MAX_INDEX_ERRORS: u32 = 3;
pub const DEFAULT_STORE_PATH: &str = "./trawlnet.sqlite";

/// Everything the daemon needs to run a scan/index cycle.
///
/// Loaded once at startup via [`Config::from_env`]; fields map directly to
/// the environment variables enumerated in SPEC_FULL.md §6.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub user: String,
    pub passwd: String,
    pub network: String,

    pub scan_interval_secs: u64,
    pub scan_timeout_secs: u64,
    pub max_scan_tasks: usize,
    pub offline_delay_secs: u64,

    pub index_interval_secs: u64,
    pub index_timeout_secs: u64,
    pub max_index_tasks: usize,
    pub max_index_errors: u32,

    /// Signal names that trigger graceful shutdown on first delivery and a
    /// hard abort on the second (see §6.4).
    pub soft_signals: Vec<String>,

    /// Path to the default SQLite store (see SPEC_FULL.md §11).
    pub store_path: String,
}

impl Config {
    /// Load configuration from the environment, applying a `.env` file if
    /// present, then validating.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            port: env_parse("PORT", DEFAULT_PORT),
            user: std::env::var("USER_").unwrap_or_else(|_| DEFAULT_USER.to_string()),
            passwd: std::env::var("PASSWD").unwrap_or_else(|_| DEFAULT_PASSWD.to_string()),
            network: std::env::var("NETWORK")
                .map_err(|_| CoreError::Config("NETWORK is required (CIDR notation)".into()))?,

            scan_interval_secs: env_parse("SCAN_INTERVAL", DEFAULT_SCAN_INTERVAL_SECS),
            scan_timeout_secs: env_parse("SCAN_TIMEOUT", DEFAULT_SCAN_TIMEOUT_SECS),
            max_scan_tasks: env_parse("MAX_SCAN_TASKS", DEFAULT_MAX_SCAN_TASKS),
            offline_delay_secs: env_parse("OFFLINE_DELAY", DEFAULT_OFFLINE_DELAY_SECS),

            index_interval_secs: env_parse("INDEX_INTERVAL", DEFAULT_INDEX_INTERVAL_SECS),
            index_timeout_secs: env_parse("INDEX_TIMEOUT", DEFAULT_INDEX_TIMEOUT_SECS),
            max_index_tasks: env_parse("MAX_INDEX_TASKS", DEFAULT_MAX_INDEX_TASKS),
            max_index_errors: env_parse("MAX_INDEX_ERRORS", DEFAULT_MAX_INDEX_ERRORS),

            soft_signals: std::env::var("SOFT_SIGNALS")
                .unwrap_or_else(|_| "SIGINT,SIGTERM".to_string())
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),

            store_path: std::env::var("STORE_PATH")
                .unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.parse::<ipnetwork::Ipv4Network>().is_err() {
            return Err(CoreError::InvalidNetwork(self.network.clone()));
        }
        if self.max_scan_tasks == 0 {
            return Err(CoreError::Config("MAX_SCAN_TASKS must be greater than 0".into()));
        }
        if self.max_index_tasks == 0 {
            return Err(CoreError::Config("MAX_INDEX_TASKS must be greater than 0".into()));
        }
        if self.max_scan_tasks > 4096 {
            tracing::warn!(
                max_scan_tasks = self.max_scan_tasks,
                "MAX_SCAN_TASKS is unusually high; this may exceed the open file descriptor \
                 limit on this host (check `ulimit -n`)"
            );
        }
        if self.soft_signals.is_empty() {
            tracing::warn!("SOFT_SIGNALS is empty; the daemon will only stop on a hard kill");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn offline_delay(&self) -> Duration {
        Duration::from_secs(self.offline_delay_secs)
    }

    pub fn index_interval(&self) -> Duration {
        Duration::from_secs(self.index_interval_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            passwd: DEFAULT_PASSWD.to_string(),
            network: "192.168.0.0/24".to_string(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            max_scan_tasks: DEFAULT_MAX_SCAN_TASKS,
            offline_delay_secs: DEFAULT_OFFLINE_DELAY_SECS,
            index_interval_secs: DEFAULT_INDEX_INTERVAL_SECS,
            index_timeout_secs: DEFAULT_INDEX_TIMEOUT_SECS,
            max_index_tasks: DEFAULT_MAX_INDEX_TASKS,
            max_index_errors: DEFAULT_MAX_INDEX_ERRORS,
            soft_signals: vec!["SIGINT".to_string(), "SIGTERM".to_string()],
            store_path: DEFAULT_STORE_PATH.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "PORT", "USER_", "PASSWD", "NETWORK", "SCAN_INTERVAL", "SCAN_TIMEOUT",
            "MAX_SCAN_TASKS", "OFFLINE_DELAY", "INDEX_INTERVAL", "INDEX_TIMEOUT",
            "MAX_INDEX_TASKS", "MAX_INDEX_ERRORS", "SOFT_SIGNALS", "STORE_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn from_env_requires_network() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn from_env_applies_defaults() {
        clear_env();
        std::env::set_var("NETWORK", "10.0.0.0/24");
        let config = Config::from_env().unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.user, DEFAULT_USER);
        assert_eq!(config.soft_signals, vec!["SIGINT", "SIGTERM"]);
        std::env::remove_var("NETWORK");
    }

    #[test]
    fn validate_rejects_bad_cidr() {
        let mut config = Config::default();
        config.network = "not-a-cidr".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_task_caps() {
        let mut config = Config::default();
        config.max_scan_tasks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_helpers_match_seconds() {
        let config = Config::default();
        assert_eq!(config.scan_interval(), Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS));
        assert_eq!(config.index_timeout(), Duration::from_secs(DEFAULT_INDEX_TIMEOUT_SECS));
    }
}
