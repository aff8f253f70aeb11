//! The file index: per-host file listings, pruning, and search (§6.2).

use std::collections::HashSet;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single file record, as discovered by a [`crate::walker::Walker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub ip: Ipv4Addr,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub name: String,
    pub host: Ipv4Addr,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    pub file_count: u64,
    pub size: u64,
}

/// A scoped write handle over one host's file listing. On entry every
/// existing record for that host has already been removed; the new
/// snapshot becomes visible only once [`commit`] succeeds.
///
/// [`commit`]: IndexSink::commit
#[async_trait]
pub trait IndexSink: Send {
    async fn append(&mut self, files: Vec<FileRecord>) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait FileIndex: Send + Sync {
    async fn open_session_for_host(&self, ip: Ipv4Addr) -> Result<Box<dyn IndexSink>>;
    async fn prune(&self, keep: &HashSet<Ipv4Addr>) -> Result<()>;
    async fn search(
        &self,
        terms: &[String],
        hosts: &HashSet<Ipv4Addr>,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;
    async fn stats(&self, ip: Ipv4Addr) -> Result<HostStats>;
}
