//! The host registry: online status, naming, and indexation bookkeeping
//! (§6.1, §3 "Scheduling state").

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One host's registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub ip: Ipv4Addr,
    pub name: String,
    pub online: bool,
    pub last_online: DateTime<Utc>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub file_count: Option<u64>,
    pub size: Option<u64>,
}

impl Host {
    pub fn new(ip: Ipv4Addr, name: String, now: DateTime<Utc>) -> Self {
        Self { ip, name, online: true, last_online: now, last_indexed: None, file_count: None, size: None }
    }
}

/// A scoped write handle over the registry. Dropping without [`commit`]
/// discards every mutation made through it.
///
/// [`commit`]: RegistrySession::commit
#[async_trait]
pub trait RegistrySession: Send {
    async fn set_hosts(&mut self, hosts: HashMap<Ipv4Addr, Host>) -> Result<()>;
    async fn get_hosts(&mut self) -> Result<HashMap<Ipv4Addr, Host>>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Persists host metadata. Consumed by the daemon; implementations are an
/// external collaborator, not specified beyond this interface.
#[async_trait]
pub trait ScanRegistry: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RegistrySession>>;
}
