//! Polling scheduler
//!
//! Drives a [`FilterEngine`] on a tokio runtime: periodic scans, the cache
//! clear timer, the delayed re-scan after a block, and the in-flight service
//! requests. Scans never wait for responses; each response is applied when
//! its task finishes.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant, Interval};

use bb_core::{BatchId, Dispatch, EntryIdentity, FilterEngine, PageHost, ScanReport, ServiceError};

use crate::transport::Transport;

type Completion = (BatchId, Result<String, ServiceError>);

/// User actions fed into a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Block(EntryIdentity),
    Unblock(String),
    ClearCache,
}

/// Cloneable sender for [`Command`]s.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Returns `false` once the scheduler is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

pub struct Scheduler<H: PageHost, T> {
    engine: FilterEngine<H::Entry>,
    host: H,
    transport: Arc<T>,
    started: Instant,
    in_flight: JoinSet<Completion>,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl<H, T> Scheduler<H, T>
where
    H: PageHost,
    T: Transport + 'static,
{
    pub fn new(engine: FilterEngine<H::Entry>, host: H, transport: Arc<T>) -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        Self {
            engine,
            host,
            transport,
            started: Instant::now(),
            in_flight: JoinSet::new(),
            commands,
            command_tx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.command_tx.clone(),
        }
    }

    pub fn engine(&self) -> &FilterEngine<H::Entry> {
        &self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Elapsed session time, the engine's clock.
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn dispatch(&mut self, dispatches: impl IntoIterator<Item = Dispatch>) {
        for Dispatch { batch, request } in dispatches {
            let transport = Arc::clone(&self.transport);
            self.in_flight.spawn(async move {
                let result = transport.send(&request).await;
                (batch, result)
            });
        }
    }

    fn finish(&mut self, joined: Result<Completion, JoinError>) {
        match joined {
            Ok((batch, result)) => {
                let now = self.now();
                self.engine.complete(&mut self.host, batch, result, now);
            }
            Err(e) => log::error!("request task failed: {}", e),
        }
    }

    /// Run one scan and send its requests without waiting for them.
    pub fn step(&mut self) -> ScanReport {
        let now = self.now();
        let report = self.engine.scan(&mut self.host, now);
        self.dispatch(report.dispatches.iter().cloned());
        report
    }

    /// Wait for every in-flight request and apply the responses.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            self.finish(joined);
        }
    }

    /// One synchronous cycle: scan, settle, and the delayed re-scan if a
    /// block succeeded meanwhile.
    pub async fn cycle(&mut self) -> ScanReport {
        let report = self.step();
        self.settle().await;
        if let Some(at) = self.engine.rescan_at() {
            time::sleep_until(self.started + at).await;
            let now = self.now();
            if self.engine.take_rescan(now) {
                self.step();
                self.settle().await;
            }
        }
        report
    }

    pub fn apply(&mut self, command: Command) {
        let dispatch = match command {
            Command::Block(target) => self.engine.block(target),
            Command::Unblock(subject) => self.engine.unblock(&subject),
            Command::ClearCache => {
                self.engine.clear_cache();
                None
            }
        };
        self.dispatch(dispatch);
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    /// Returns the host so callers can inspect the final page state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> H {
        let timings = self.engine.timings().clone();
        let interval = timings.scan_interval();
        log::info!(
            "scheduler started: {} page, scan every {:?}, cache clear {:?}",
            self.engine.kind().as_str(),
            interval,
            timings.cache_clear()
        );

        let mut next_scan = Instant::now() + timings.start_delay();
        let mut clear = timings
            .cache_clear()
            .map(|period| time::interval_at(Instant::now() + period, period));

        loop {
            let rescan = self.engine.rescan_at().map(|at| self.started + at);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = time::sleep_until(next_scan) => {
                    self.step();
                    next_scan = Instant::now() + interval;
                }
                _ = sleep_until_opt(rescan) => {
                    let now = self.now();
                    if self.engine.take_rescan(now) {
                        self.step();
                    }
                }
                _ = tick_opt(&mut clear) => self.engine.clear_cache(),
                Some(joined) = self.in_flight.join_next() => self.finish(joined),
                Some(command) = self.commands.recv() => self.apply(command),
            }
        }

        self.in_flight.abort_all();
        log::info!("scheduler stopped");
        self.host
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::FnTransport;
    use bb_core::config::PageTimings;
    use bb_core::memory::{FixtureEntry, MemoryHost};
    use bb_core::strategy::HomeFeed;
    use bb_core::wire::Endpoint;
    use bb_core::{EngineConfig, ServiceRequest};

    const HOME: &str = "https://www.bilibili.com/";

    fn card(label: &str, mid: &str) -> FixtureEntry {
        FixtureEntry::new(label)
            .with_attr(HomeFeed::OWNER_LINK, "href", &format!("//space.bilibili.com/{}", mid))
            .with_text(HomeFeed::AUTHOR, label)
    }

    /// Service that blocks every id in `blocked` and accepts every block.
    fn service(blocked: &'static [&'static str]) -> impl Fn(&ServiceRequest) -> Result<String, ServiceError> {
        move |request: &ServiceRequest| match request.endpoint {
            Endpoint::IsExistBatch => {
                let flags: Vec<&str> = request.params[0]
                    .1
                    .split(',')
                    .map(|id| if blocked.contains(&id) { "True" } else { "False" })
                    .collect();
                Ok(serde_json::to_string(&flags).unwrap())
            }
            Endpoint::Block => Ok("OK".to_string()),
            _ => Ok("ERR1".to_string()),
        }
    }

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.pages.home = PageTimings {
            scan_interval_ms: 10,
            start_delay_ms: 0,
            cache_clear_ms: Some(60_000),
        };
        config.rescan_delay_ms = 5;
        config
    }

    #[tokio::test]
    async fn test_cycle_hides_blocked_entries() {
        let host = MemoryHost::from_entries(vec![card("a", "1"), card("b", "2"), card("c", "3")]);
        let engine = FilterEngine::for_url(HOME, EngineConfig::default()).unwrap();
        let transport = Arc::new(FnTransport::new(service(&["2"])));
        let mut scheduler = Scheduler::new(engine, host, Arc::clone(&transport));

        let report = scheduler.cycle().await;
        assert_eq!(report.queued, 3);
        assert_eq!(scheduler.host().hidden_labels(), vec!["b"]);

        // Everything cached: no new requests
        scheduler.cycle().await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_skips_queries() {
        let host = MemoryHost::from_entries(vec![card("a", "1")]);
        let mut config = EngineConfig::default();
        config.recovery = bb_core::RecoveryPolicy::Never;
        let engine = FilterEngine::for_url(HOME, config).unwrap();
        let transport = Arc::new(FnTransport::new(|_: &ServiceRequest| {
            Err(ServiceError::Transport("connection refused".into()))
        }));
        let mut scheduler = Scheduler::new(engine, host, Arc::clone(&transport));

        scheduler.cycle().await;
        scheduler.cycle().await;
        scheduler.cycle().await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(scheduler.host().notices(), &[bb_core::Notice::Offline]);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let host = MemoryHost::from_entries(vec![card("a", "1"), card("b", "2")]);
        let engine = FilterEngine::for_url(HOME, fast_config()).unwrap();
        let transport = Arc::new(FnTransport::new(service(&["1"])));
        let scheduler = Scheduler::new(engine, host, Arc::clone(&transport));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.run(stop_rx));
        time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(true).unwrap();
        let host = task.await.unwrap();

        assert_eq!(host.hidden_labels(), vec!["a"]);
        // Both ids resolved by the first batch; later scans are cache hits
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_block_command_triggers_rescan() {
        let host = MemoryHost::from_entries(vec![card("a", "1"), card("b", "2")]);
        let engine = FilterEngine::for_url(HOME, fast_config()).unwrap();
        let transport = Arc::new(FnTransport::new(service(&[])));
        let scheduler = Scheduler::new(engine, host, Arc::clone(&transport));
        let handle = scheduler.handle();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.run(stop_rx));
        time::sleep(Duration::from_millis(50)).await;
        assert!(handle.send(Command::Block(EntryIdentity::new("2", "b"))));
        time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        let host = task.await.unwrap();

        assert_eq!(host.hidden_labels(), vec!["b"]);
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|r| r.endpoint == Endpoint::Block).count(), 1);
        assert_eq!(calls.iter().filter(|r| r.endpoint == Endpoint::IsExistBatch).count(), 1);
    }
}
