//! Network address enumeration and reverse-DNS naming.

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::Ipv4Network;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Enumerate the usable host addresses of an IPv4 CIDR, excluding the
/// network and broadcast addresses (§4.3).
pub fn enumerate_hosts(cidr: &str) -> Result<Vec<Ipv4Addr>> {
    let network: Ipv4Network = cidr
        .parse()
        .map_err(|_| CoreError::InvalidNetwork(cidr.to_string()))?;

    // Mirrors Python's `ipaddress.IPv4Network.hosts()`: a /31 or /32 has no
    // distinct network/broadcast address to exclude, so every address in the
    // block is a host.
    if network.prefix() >= 31 {
        return Ok(network.iter().collect());
    }

    let net_addr = network.network();
    let broadcast_addr = network.broadcast();
    Ok(network.iter().filter(|addr| *addr != net_addr && *addr != broadcast_addr).collect())
}

/// Resolve the reverse-DNS name of an address, falling back silently to the
/// address itself on any lookup failure.
///
/// Resolved per SPEC_FULL.md §9's open question: the reference
/// implementation's `reverse_ip` helper (`scanner.py`) swallows
/// `socket.herror` and returns the raw address with no diagnostic marker,
/// and this crate follows suit.
pub async fn reverse_name(ip: Ipv4Addr) -> String {
    let addr = IpAddr::V4(ip);
    match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr)).await {
        Ok(Ok(name)) => name,
        Ok(Err(err)) => {
            debug!(%ip, error = %err, "reverse DNS lookup failed, falling back to raw address");
            ip.to_string()
        },
        Err(_join_err) => ip.to_string(),
    }
}
