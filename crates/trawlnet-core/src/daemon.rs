//! The daemon: scan loop, indexation scheduler, worker pool, and shutdown
//! (§4.6).
//!
//! The reference implementation runs an event-loop thread plus a worker
//! thread pool, with scheduling state mutated only on the event-loop
//! thread and cross-thread transitions posted back as callbacks. A single
//! tokio task already gives that single-writer guarantee for free, so the
//! "event loop" here is just [`Daemon::run`]'s `select!` loop; the
//! `submitted → busy` hop described in §4.6.4 is still modelled explicitly
//! as a posted [`Event::Busy`] message, both because the spec calls it out
//! as a deliberate synchronization point and because it is what lets
//! shutdown tell apart tasks that haven't started a walk yet (abortable)
//! from ones that have (left to finish).

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::index::FileIndex;
use crate::registry::{Host, RegistrySession, ScanRegistry};
use crate::scanner::{prober_config_from, Scanner};
use crate::session::{RetryingFtp, SessionConfig};
use crate::walker::Walker;

struct IndexOutcome {
    success: bool,
    file_count: Option<u64>,
    size: Option<u64>,
}

enum Event {
    Submit(Ipv4Addr),
    Busy(Ipv4Addr),
    Indexed { ip: Ipv4Addr, outcome: IndexOutcome },
}

/// A handle used to request graceful shutdown, e.g. from a signal handler.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn request_stop(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Daemon {
    config: Config,
    scanner: Scanner,
    registry: Arc<dyn ScanRegistry>,
    index: Arc<dyn FileIndex>,

    hosts: HashMap<Ipv4Addr, Host>,
    scheduled: HashMap<Ipv4Addr, JoinHandle<()>>,
    submitted: HashMap<Ipv4Addr, JoinHandle<()>>,
    busy: HashSet<Ipv4Addr>,

    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    index_semaphore: Arc<Semaphore>,

    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    stopping: bool,
}

impl Daemon {
    pub fn new(config: Config, registry: Arc<dyn ScanRegistry>, index: Arc<dyn FileIndex>) -> Self {
        let prober_config = prober_config_from(
            config.port,
            &config.user,
            &config.passwd,
            config.scan_timeout(),
        );
        let scanner = Scanner::new(prober_config, config.max_scan_tasks);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let index_semaphore = Arc::new(Semaphore::new(config.max_index_tasks));

        Self {
            config,
            scanner,
            registry,
            index,
            hosts: HashMap::new(),
            scheduled: HashMap::new(),
            submitted: HashMap::new(),
            busy: HashSet::new(),
            events_tx,
            events_rx,
            index_semaphore,
            stop_tx,
            stop_rx,
            stopping: false,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.stop_tx.clone() }
    }

    /// Runs the scan/index loop until shutdown is requested. Returns once
    /// every outstanding walk has finished.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        let scan_interval = self.config.scan_interval();
        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = self.stop_rx.changed() => {
                    if changed.is_ok() && *self.stop_rx.borrow() {
                        break;
                    }
                },

                () = &mut sleep => {
                    match self.scanner.scan(&self.config.network).await {
                        Ok(online) => self.process(online, Utc::now()).await,
                        Err(err) => error!(error = %err, "scan failed"),
                    }
                    sleep.as_mut().reset(tokio::time::Instant::now() + scan_interval);
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event, Utc::now()).await;
                },
            }
        }

        self.stop().await;
    }

    async fn handle_event(&mut self, event: Event, now: DateTime<Utc>) {
        match event {
            Event::Submit(ip) => self.submit(ip).await,
            Event::Busy(ip) => {
                self.submitted.remove(&ip);
                self.busy.insert(ip);
            },
            Event::Indexed { ip, outcome } => self.indexed(ip, outcome, now).await,
        }
    }

    /// §4.6.2 reconciliation.
    async fn process(&mut self, online: HashSet<crate::scanner::LiveHost>, now: DateTime<Utc>) {
        for host in self.hosts.values_mut() {
            host.online = false;
        }
        for live in &online {
            self.hosts
                .entry(live.ip)
                .and_modify(|h| {
                    h.online = true;
                    h.last_online = now;
                    h.name = live.name.clone();
                })
                .or_insert_with(|| Host::new(live.ip, live.name.clone(), now));
        }

        let offline_delay = match chrono::Duration::from_std(self.config.offline_delay()) {
            Ok(d) => d,
            Err(_) => chrono::Duration::zero(),
        };
        let limit = now - offline_delay;
        self.hosts.retain(|_, h| h.last_online >= limit);

        let due: Vec<Ipv4Addr> = self
            .hosts
            .values()
            .filter(|h| {
                h.online
                    && !self.scheduled.contains_key(&h.ip)
                    && !self.submitted.contains_key(&h.ip)
                    && !self.busy.contains(&h.ip)
            })
            .map(|h| h.ip)
            .collect();

        for ip in due {
            let delay = self.hosts.get(&ip).and_then(|h| h.last_indexed).map_or(
                Duration::ZERO,
                |last_indexed| {
                    let target = last_indexed
                        + chrono::Duration::from_std(self.config.index_interval())
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    let remaining = target - now;
                    remaining.to_std().unwrap_or(Duration::ZERO)
                },
            );
            self.schedule_submit(ip, delay);
        }

        if let Err(err) = self.persist_registry().await {
            error!(error = %err, "failed to persist registry snapshot");
        }
        let keep: HashSet<Ipv4Addr> = self.hosts.keys().copied().collect();
        if let Err(err) = self.index.prune(&keep).await {
            error!(error = %err, "failed to prune file index");
        }
    }

    fn schedule_submit(&mut self, ip: Ipv4Addr, delay: Duration) {
        let tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Submit(ip));
        });
        self.scheduled.insert(ip, handle);
    }

    /// §4.6.3 submission.
    async fn submit(&mut self, ip: Ipv4Addr) {
        self.scheduled.remove(&ip);

        let Some(host) = self.hosts.get(&ip) else { return };
        if !host.online {
            return;
        }

        let session_config = SessionConfig {
            ip,
            port: self.config.port,
            user: self.config.user.clone(),
            passwd: self.config.passwd.clone(),
            timeout: self.config.index_timeout(),
            max_errors: self.config.max_index_errors,
        };
        let semaphore = self.index_semaphore.clone();
        let index = self.index.clone();
        let tx = self.events_tx.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let _ = tx.send(Event::Busy(ip));
            let outcome = run_index_task(ip, session_config, index).await;
            let _ = tx.send(Event::Indexed { ip, outcome });
        });
        self.submitted.insert(ip, handle);
    }

    /// §4.6.5 completion.
    async fn indexed(&mut self, ip: Ipv4Addr, outcome: IndexOutcome, now: DateTime<Utc>) {
        if outcome.success {
            if let Some(host) = self.hosts.get_mut(&ip) {
                host.last_indexed = Some(now);
                host.file_count = outcome.file_count;
                host.size = outcome.size;
            }
            if let Err(err) = self.persist_registry().await {
                error!(error = %err, "failed to persist registry snapshot after indexing");
            }
        }

        self.busy.remove(&ip);

        if !self.stopping {
            if let Some(host) = self.hosts.get(&ip) {
                if host.online {
                    self.schedule_submit(ip, self.config.index_interval());
                }
            }
        }
    }

    async fn persist_registry(&self) -> crate::error::Result<()> {
        let mut session = self.registry.open_session().await?;
        session.set_hosts(self.hosts.clone()).await?;
        session.commit().await
    }

    /// §4.6.6 shutdown. Idempotent.
    async fn stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        info!("shutting down");

        for (_, handle) in self.scheduled.drain() {
            handle.abort();
        }

        // Promote any submitted task that already reported `Busy` (but
        // hasn't been processed yet) before deciding what's still safe to
        // abort, so a task that has started its walk is never cancelled.
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event, Utc::now()).await;
        }

        let submitted: Vec<(Ipv4Addr, JoinHandle<()>)> = self.submitted.drain().collect();
        for (_, handle) in &submitted {
            handle.abort();
        }
        for (ip, handle) in submitted {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(%ip, error = %err, "submitted task ended abnormally during shutdown");
                }
            }
        }

        // Walks already in `busy` are left to finish; their completion
        // callback observes `stopping` and skips rescheduling.
        while !self.busy.is_empty() {
            match self.events_rx.recv().await {
                Some(Event::Indexed { ip, outcome }) => self.indexed(ip, outcome, Utc::now()).await,
                Some(_) => {},
                None => break,
            }
        }
    }
}

async fn run_index_task(
    ip: Ipv4Addr,
    session_config: SessionConfig,
    index: Arc<dyn FileIndex>,
) -> IndexOutcome {
    let ftp = RetryingFtp::new(session_config);
    let walker = Walker::new(ftp, index.as_ref(), ip);

    match walker.walk().await {
        Ok(()) => match index.stats(ip).await {
            Ok(stats) => IndexOutcome {
                success: true,
                file_count: Some(stats.file_count),
                size: Some(stats.size),
            },
            Err(err) => {
                error!(%ip, error = %err, "failed to read stats after a successful walk");
                IndexOutcome { success: false, file_count: None, size: None }
            },
        },
        Err(err) => {
            warn!(%ip, error = %err, "walk failed");
            IndexOutcome { success: false, file_count: None, size: None }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::index::{FileRecord, HostStats, IndexSink, SearchHit};

    #[derive(Default)]
    struct FakeRegistry {
        hosts: Arc<Mutex<HashMap<Ipv4Addr, Host>>>,
    }

    struct FakeRegistrySession {
        hosts: Arc<Mutex<HashMap<Ipv4Addr, Host>>>,
        pending: HashMap<Ipv4Addr, Host>,
    }

    #[async_trait]
    impl RegistrySession for FakeRegistrySession {
        async fn set_hosts(&mut self, hosts: HashMap<Ipv4Addr, Host>) -> crate::error::Result<()> {
            self.pending = hosts;
            Ok(())
        }

        async fn get_hosts(&mut self) -> crate::error::Result<HashMap<Ipv4Addr, Host>> {
            Ok(self.hosts.lock().unwrap().clone())
        }

        async fn commit(self: Box<Self>) -> crate::error::Result<()> {
            *self.hosts.lock().unwrap() = self.pending;
            Ok(())
        }
    }

    #[async_trait]
    impl ScanRegistry for FakeRegistry {
        async fn open_session(&self) -> crate::error::Result<Box<dyn RegistrySession>> {
            Ok(Box::new(FakeRegistrySession { hosts: self.hosts.clone(), pending: HashMap::new() }))
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        pruned_with: Mutex<Option<HashSet<Ipv4Addr>>>,
    }

    struct FakeSink;

    #[async_trait]
    impl IndexSink for FakeSink {
        async fn append(&mut self, _files: Vec<FileRecord>) -> crate::error::Result<()> {
            Ok(())
        }
        async fn commit(self: Box<Self>) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl FileIndex for FakeIndex {
        async fn open_session_for_host(&self, _ip: Ipv4Addr) -> crate::error::Result<Box<dyn IndexSink>> {
            Ok(Box::new(FakeSink))
        }
        async fn prune(&self, keep: &HashSet<Ipv4Addr>) -> crate::error::Result<()> {
            *self.pruned_with.lock().unwrap() = Some(keep.clone());
            Ok(())
        }
        async fn search(
            &self,
            _terms: &[String],
            _hosts: &HashSet<Ipv4Addr>,
            _limit: usize,
        ) -> crate::error::Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
        async fn stats(&self, _ip: Ipv4Addr) -> crate::error::Result<HostStats> {
            Ok(HostStats::default())
        }
    }

    fn test_daemon() -> Daemon {
        test_daemon_with_index().0
    }

    fn test_daemon_with_index() -> (Daemon, Arc<FakeIndex>) {
        let config = Config { network: "10.0.0.0/24".to_string(), ..Config::default() };
        let registry: Arc<dyn ScanRegistry> = Arc::new(FakeRegistry::default());
        let index = Arc::new(FakeIndex::default());
        let daemon = Daemon::new(config, registry, index.clone() as Arc<dyn FileIndex>);
        (daemon, index)
    }

    fn live(ip: Ipv4Addr) -> crate::scanner::LiveHost {
        crate::scanner::LiveHost { ip, name: ip.to_string() }
    }

    #[tokio::test]
    async fn process_schedules_a_newly_online_host_at_zero_delay() {
        let mut daemon = test_daemon();
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), now).await;

        assert!(daemon.hosts.get(&ip).unwrap().online);
        assert_eq!(daemon.hosts.get(&ip).unwrap().last_online, now);
        assert!(daemon.scheduled.contains_key(&ip));
        assert!(!daemon.submitted.contains_key(&ip));
        assert!(!daemon.busy.contains(&ip));
    }

    #[tokio::test]
    async fn process_is_idempotent_for_an_already_scheduled_host() {
        let mut daemon = test_daemon();
        let ip = Ipv4Addr::new(10, 0, 0, 6);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), now).await;
        assert_eq!(daemon.scheduled.len(), 1);

        // A second reconciliation with the same online set must not
        // schedule a second timer for a host already in `scheduled`.
        daemon.process(HashSet::from([live(ip)]), now).await;
        assert_eq!(daemon.scheduled.len(), 1);
    }

    #[tokio::test]
    async fn process_marks_offline_and_evicts_past_offline_delay() {
        let mut daemon = test_daemon();
        daemon.config.offline_delay_secs = 60;
        let ip = Ipv4Addr::new(10, 0, 0, 7);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), t0).await;
        assert!(daemon.hosts.get(&ip).unwrap().online);

        // Same host absent from the next scan: online flips false, but the
        // host survives until `offline_delay` has elapsed.
        let t1 = t0 + chrono::Duration::seconds(30);
        daemon.process(HashSet::new(), t1).await;
        assert!(!daemon.hosts.get(&ip).unwrap().online);
        assert_eq!(daemon.hosts.get(&ip).unwrap().last_online, t0);

        let t2 = t0 + chrono::Duration::seconds(120);
        daemon.process(HashSet::new(), t2).await;
        assert!(daemon.hosts.get(&ip).is_none());
    }

    #[tokio::test]
    async fn indexed_updates_stats_clears_busy_and_reschedules() {
        let mut daemon = test_daemon();
        let ip = Ipv4Addr::new(10, 0, 0, 8);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), now).await;
        daemon.scheduled.remove(&ip);
        daemon.busy.insert(ip);

        let outcome = IndexOutcome { success: true, file_count: Some(3), size: Some(60) };
        daemon.indexed(ip, outcome, now).await;

        let host = daemon.hosts.get(&ip).unwrap();
        assert_eq!(host.last_indexed, Some(now));
        assert_eq!(host.file_count, Some(3));
        assert_eq!(host.size, Some(60));
        assert!(!daemon.busy.contains(&ip));
        assert!(daemon.scheduled.contains_key(&ip));
    }

    #[tokio::test]
    async fn indexed_does_not_reschedule_once_stopping() {
        let mut daemon = test_daemon();
        let ip = Ipv4Addr::new(10, 0, 0, 9);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), now).await;
        daemon.scheduled.remove(&ip);
        daemon.busy.insert(ip);
        daemon.stopping = true;

        let outcome = IndexOutcome { success: false, file_count: None, size: None };
        daemon.indexed(ip, outcome, now).await;

        assert!(!daemon.busy.contains(&ip));
        assert!(!daemon.scheduled.contains_key(&ip));
    }

    #[tokio::test]
    async fn a_host_is_never_in_more_than_one_of_scheduled_submitted_busy() {
        let mut daemon = test_daemon();
        let ip = Ipv4Addr::new(10, 0, 0, 10);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), now).await;
        assert_disjoint(&daemon, ip);

        // process → submitted→busy hop (modelled via Event::Busy).
        daemon.scheduled.remove(&ip);
        assert_disjoint(&daemon, ip);
        daemon.busy.insert(ip);
        assert_disjoint(&daemon, ip);

        let outcome = IndexOutcome { success: true, file_count: Some(0), size: Some(0) };
        daemon.indexed(ip, outcome, now).await;
        assert_disjoint(&daemon, ip);
    }

    #[tokio::test]
    async fn process_prunes_the_file_index_to_the_surviving_host_set() {
        let (mut daemon, index) = test_daemon_with_index();
        let ip = Ipv4Addr::new(10, 0, 0, 11);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        daemon.process(HashSet::from([live(ip)]), now).await;

        assert_eq!(index.pruned_with.lock().unwrap().as_ref(), Some(&HashSet::from([ip])));
    }

    fn assert_disjoint(daemon: &Daemon, ip: Ipv4Addr) {
        let membership = [
            daemon.scheduled.contains_key(&ip),
            daemon.submitted.contains_key(&ip),
            daemon.busy.contains(&ip),
        ];
        assert!(membership.iter().filter(|&&present| present).count() <= 1);
    }
}
