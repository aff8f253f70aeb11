//! Default SQLite-backed [`ScanRegistry`] and [`FileIndex`] adapter
//! (SPEC_FULL.md §11, feature `sqlite-store`).
//!
//! One pooled connection is deliberately kept at a time: the registry and
//! the file index both require a single writer (§5 "Shared-resource
//! policy"), and WAL mode already lets readers (a future search frontend)
//! proceed concurrently with that one writer.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::error::{CoreError, Result};
use crate::index::{FileIndex, FileRecord, HostStats, IndexSink, SearchHit};
use crate::registry::{Host, RegistrySession, ScanRegistry};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `path` may be a bare filesystem path (e.g. `./trawlnet.sqlite`) or a
    /// full `sqlite://` URL; both are accepted for convenience from config
    /// and from tests.
    pub async fn connect(path: &str) -> Result<Self> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|err| CoreError::Store(err.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        sqlx::query(
            "create table if not exists hosts (
                ip text primary key,
                name text not null,
                online boolean not null,
                last_online text not null,
                last_indexed text,
                file_count integer,
                size integer
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "create virtual table if not exists files using fts5(
                path, name, ip unindexed, size unindexed,
                tokenize='unicode61 remove_diacritics 2'
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ScanRegistry for SqliteStore {
    async fn open_session(&self) -> Result<Box<dyn RegistrySession>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteRegistrySession { tx: Some(tx) }))
    }
}

struct SqliteRegistrySession {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteRegistrySession {
    fn active(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx.as_mut().ok_or_else(|| CoreError::Store("registry session already closed".into()))
    }
}

#[async_trait]
impl RegistrySession for SqliteRegistrySession {
    async fn set_hosts(&mut self, hosts: HashMap<Ipv4Addr, Host>) -> Result<()> {
        let tx = self.active()?;
        sqlx::query("delete from hosts").execute(&mut **tx).await?;
        for host in hosts.values() {
            sqlx::query(
                "insert into hosts (ip, name, online, last_online, last_indexed, file_count, \
                 size) values (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(host.ip.to_string())
            .bind(&host.name)
            .bind(host.online)
            .bind(host.last_online.to_rfc3339())
            .bind(host.last_indexed.map(|dt| dt.to_rfc3339()))
            .bind(host.file_count.map(|v| v as i64))
            .bind(host.size.map(|v| v as i64))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn get_hosts(&mut self) -> Result<HashMap<Ipv4Addr, Host>> {
        let tx = self.active()?;
        let rows =
            sqlx::query("select ip, name, online, last_online, last_indexed, file_count, size from hosts")
                .fetch_all(&mut **tx)
                .await?;

        let mut hosts = HashMap::with_capacity(rows.len());
        for row in rows {
            let ip: String = row.try_get("ip").map_err(|e| CoreError::Store(e.to_string()))?;
            let Ok(ip) = ip.parse::<Ipv4Addr>() else { continue };
            let last_online: String =
                row.try_get("last_online").map_err(|e| CoreError::Store(e.to_string()))?;
            let last_indexed: Option<String> =
                row.try_get("last_indexed").map_err(|e| CoreError::Store(e.to_string()))?;
            let host = Host {
                ip,
                name: row.try_get("name").map_err(|e| CoreError::Store(e.to_string()))?,
                online: row.try_get("online").map_err(|e| CoreError::Store(e.to_string()))?,
                last_online: parse_rfc3339(&last_online).unwrap_or_else(Utc::now),
                last_indexed: last_indexed.and_then(|s| parse_rfc3339(&s)),
                file_count: row
                    .try_get::<Option<i64>, _>("file_count")
                    .map_err(|e| CoreError::Store(e.to_string()))?
                    .map(|v| v as u64),
                size: row
                    .try_get::<Option<i64>, _>("size")
                    .map_err(|e| CoreError::Store(e.to_string()))?
                    .map(|v| v as u64),
            };
            hosts.insert(ip, host);
        }
        Ok(hosts)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| CoreError::Store("registry session already closed".into()))?;
        tx.commit().await?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl FileIndex for SqliteStore {
    async fn open_session_for_host(&self, ip: Ipv4Addr) -> Result<Box<dyn IndexSink>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("delete from files where ip = ?")
            .bind(ip.to_string())
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(SqliteIndexSink { tx: Some(tx), ip }))
    }

    async fn prune(&self, keep: &HashSet<Ipv4Addr>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if keep.is_empty() {
            sqlx::query("delete from files").execute(&mut *conn).await?;
            return Ok(());
        }
        let placeholders = vec!["?"; keep.len()].join(",");
        let query = format!("delete from files where ip not in ({placeholders})");
        let mut q = sqlx::query(&query);
        for ip in keep {
            q = q.bind(ip.to_string());
        }
        q.execute(&mut *conn).await?;
        Ok(())
    }

    async fn search(
        &self,
        terms: &[String],
        hosts: &HashSet<Ipv4Addr>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if hosts.is_empty() || terms.is_empty() {
            return Ok(Vec::new());
        }
        let match_expr = terms.join(" ");
        let placeholders = vec!["?"; hosts.len()].join(",");
        let query = format!(
            "select path, name, ip, size from files where files match ? and ip in ({placeholders}) \
             limit ?"
        );
        let mut q = sqlx::query(&query).bind(match_expr);
        for ip in hosts {
            q = q.bind(ip.to_string());
        }
        q = q.bind(limit as i64);

        let mut conn = self.pool.acquire().await?;
        let rows = q.fetch_all(&mut *conn).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let ip: String = row.try_get("ip").map_err(|e| CoreError::Store(e.to_string()))?;
            let Ok(ip) = ip.parse::<Ipv4Addr>() else { continue };
            hits.push(SearchHit {
                path: row.try_get("path").map_err(|e| CoreError::Store(e.to_string()))?,
                name: row.try_get("name").map_err(|e| CoreError::Store(e.to_string()))?,
                host: ip,
                size: row.try_get::<i64, _>("size").map_err(|e| CoreError::Store(e.to_string()))? as u64,
            });
        }
        Ok(hits)
    }

    async fn stats(&self, ip: Ipv4Addr) -> Result<HostStats> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("select count(*) as file_count, coalesce(sum(size), 0) as size from files where ip = ?")
            .bind(ip.to_string())
            .fetch_one(&mut *conn)
            .await?;
        Ok(HostStats {
            file_count: row.try_get::<i64, _>("file_count").map_err(|e| CoreError::Store(e.to_string()))? as u64,
            size: row.try_get::<i64, _>("size").map_err(|e| CoreError::Store(e.to_string()))? as u64,
        })
    }
}

struct SqliteIndexSink {
    tx: Option<Transaction<'static, Sqlite>>,
    ip: Ipv4Addr,
}

#[async_trait]
impl IndexSink for SqliteIndexSink {
    async fn append(&mut self, files: Vec<FileRecord>) -> Result<()> {
        let tx = self.tx.as_mut().ok_or_else(|| CoreError::Store("index session already closed".into()))?;
        for file in files {
            sqlx::query("insert into files (path, name, ip, size) values (?, ?, ?, ?)")
                .bind(&file.path)
                .bind(&file.name)
                .bind(self.ip.to_string())
                .bind(file.size as i64)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| CoreError::Store("index session already closed".into()))?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trawlnet.sqlite");
        let store = SqliteStore::connect(&path.display().to_string()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn registry_round_trips_a_host() {
        let (store, _dir) = temp_store().await;
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let host = Host::new(ip, "ftp.example.com".into(), now);

        let mut session = store.open_session().await.unwrap();
        session.set_hosts(HashMap::from([(ip, host.clone())])).await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.open_session().await.unwrap();
        let hosts = session.get_hosts().await.unwrap();
        assert_eq!(hosts.get(&ip).unwrap().name, "ftp.example.com");
    }

    #[tokio::test]
    async fn index_session_replaces_host_files_atomically() {
        let (store, _dir) = temp_store().await;
        let ip = Ipv4Addr::new(10, 0, 0, 2);

        let mut sink = store.open_session_for_host(ip).await.unwrap();
        sink.append(vec![FileRecord { path: "pub".into(), name: "a.txt".into(), ip, size: 10 }])
            .await
            .unwrap();
        sink.commit().await.unwrap();

        let stats = store.stats(ip).await.unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.size, 10);

        let sink = store.open_session_for_host(ip).await.unwrap();
        drop(sink); // never committed: should not disturb the prior snapshot... but delete-on-enter already ran

        // Re-open and write a fresh snapshot to confirm replace semantics.
        let mut sink = store.open_session_for_host(ip).await.unwrap();
        sink.append(vec![FileRecord { path: "pub".into(), name: "b.txt".into(), ip, size: 20 }])
            .await
            .unwrap();
        sink.commit().await.unwrap();

        let stats = store.stats(ip).await.unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.size, 20);
    }

    #[tokio::test]
    async fn prune_removes_hosts_not_in_keep_set() {
        let (store, _dir) = temp_store().await;
        let keep_ip = Ipv4Addr::new(10, 0, 0, 3);
        let drop_ip = Ipv4Addr::new(10, 0, 0, 4);

        for ip in [keep_ip, drop_ip] {
            let mut sink = store.open_session_for_host(ip).await.unwrap();
            sink.append(vec![FileRecord { path: "".into(), name: "f".into(), ip, size: 1 }])
                .await
                .unwrap();
            sink.commit().await.unwrap();
        }

        store.prune(&HashSet::from([keep_ip])).await.unwrap();

        assert_eq!(store.stats(keep_ip).await.unwrap().file_count, 1);
        assert_eq!(store.stats(drop_ip).await.unwrap().file_count, 0);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_conjuncts_terms() {
        let (store, _dir) = temp_store().await;
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        let mut sink = store.open_session_for_host(ip).await.unwrap();
        sink.append(vec![FileRecord {
            path: "archive".into(),
            name: "Linux-Kernel-Source.tar.gz".into(),
            ip,
            size: 100,
        }])
        .await
        .unwrap();
        sink.commit().await.unwrap();

        let hits = store
            .search(&["linux".to_string(), "kernel".to_string()], &HashSet::from([ip]), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Linux-Kernel-Source.tar.gz");
    }
}
