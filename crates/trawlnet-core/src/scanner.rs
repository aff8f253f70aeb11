//! Whole-network concurrency-bounded sweep (§4.3).

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::gate::BoundedGate;
use crate::net::{enumerate_hosts, reverse_name};
use crate::prober::{Prober, ProberConfig};
use crate::Result;

/// A live host discovered by a scan, with its best-effort display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveHost {
    pub ip: Ipv4Addr,
    pub name: String,
}

pub struct Scanner {
    prober_config: ProberConfig,
    max_scan_tasks: usize,
}

impl Scanner {
    pub fn new(prober_config: ProberConfig, max_scan_tasks: usize) -> Self {
        Self { prober_config, max_scan_tasks }
    }

    /// Sweeps `network`, returning the set of hosts that answered the login
    /// probe. Individual probe failures never fail the scan as a whole.
    #[instrument(skip(self), fields(network))]
    pub async fn scan(&self, network: &str) -> Result<HashSet<LiveHost>> {
        let hosts = enumerate_hosts(network)?;
        info!(count = hosts.len(), "enumerated candidate hosts");

        let gate = BoundedGate::new(self.max_scan_tasks);
        let mut tasks = Vec::with_capacity(hosts.len());

        for ip in hosts {
            let gate = gate.clone();
            let config = self.prober_config.clone();
            let timeout = config.timeout;
            tasks.push(tokio::spawn(async move {
                let permit = gate.acquire().await;
                let prober = Prober::new(&config);
                // The probe already self-bounds via its own internal
                // timeout; this outer timeout is a second, independent
                // bound so a stuck DNS or socket call can never hold a
                // permit past `scan_timeout`.
                let alive = tokio::time::timeout(timeout, prober.probe(ip))
                    .await
                    .unwrap_or(false);
                drop(permit);
                (ip, alive)
            }));
        }

        gate.join().await;

        let mut live = HashSet::new();
        for task in tasks {
            match task.await {
                Ok((ip, true)) => {
                    let name = reverse_name(ip).await;
                    live.insert(LiveHost { ip, name });
                },
                Ok((_, false)) => {},
                Err(err) => debug!(error = %err, "probe task panicked"),
            }
        }

        info!(live = live.len(), "scan complete");
        Ok(live)
    }
}

/// Convenience constructor matching the daemon's configuration surface.
pub fn prober_config_from(
    port: u16,
    user: &str,
    passwd: &str,
    scan_timeout: Duration,
) -> ProberConfig {
    ProberConfig { port, user: user.to_string(), passwd: passwd.to_string(), timeout: scan_timeout }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config(port: u16) -> ProberConfig {
        ProberConfig {
            port,
            user: "anonymous".into(),
            passwd: "a@b.com".into(),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn scan_of_unreachable_network_returns_empty_set() {
        let scanner = Scanner::new(config(1), 16);
        let live = scanner.scan("192.0.2.0/30").await.unwrap();
        assert!(live.is_empty());
    }

    #[tokio::test]
    async fn scan_rejects_invalid_cidr() {
        let scanner = Scanner::new(config(1), 16);
        assert!(scanner.scan("not-a-cidr").await.is_err());
    }
}
