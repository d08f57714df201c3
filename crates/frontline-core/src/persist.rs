//! Asynchronous persistence of ledger entries, alerts, and sessions.
//!
//! State machines hand records to a [`PersistHandle`], which never blocks
//! and never fails the caller. A single [`PersistenceSync`] task drains the
//! channel, batches records, and writes them through a [`RecordSink`]. A
//! failed write keeps its records queued for the next flush; the queue is
//! capped and sheds its oldest records when the cap is hit.
//!
//! Alert records are written strictly in order (an alert's close never
//! precedes its insert). Ledger entries, sessions, and map state history
//! are written in bulk.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use frontline_types::{Alert, AlertId, LedgerEntry, Session, ZoneMapState};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alerts::AlertManager;
use crate::clock::Clock;
use crate::config::PersistenceConfig;
use crate::error::SinkError;
use crate::health::{ServiceHealthMonitor, names};
use crate::shutdown::ShutdownSignal;

/// One record bound for durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistRecord {
    /// An applied control event.
    Ledger(LedgerEntry),
    /// A newly opened alert; storage assigns its ID.
    AlertOpened(Alert),
    /// An alert whose duration has elapsed.
    AlertClosed(Alert),
    /// A closed session.
    Session(Session),
    /// One zone's state from a reconciliation pass.
    MapState(ZoneMapState),
}

/// Durable storage for derived records.
pub trait RecordSink: Send + Sync {
    /// Append ledger entries.
    fn write_ledger(&self, entries: &[LedgerEntry])
    -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Append closed sessions.
    fn write_sessions(&self, sessions: &[Session])
    -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Append map state history rows.
    fn write_map_states(
        &self,
        states: &[ZoneMapState],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Insert a newly opened alert and return its durable ID.
    fn open_alert(&self, alert: &Alert) -> impl Future<Output = Result<AlertId, SinkError>> + Send;

    /// Mark an alert as finished. Alerts are keyed by (world, zone, start).
    fn close_alert(&self, alert: &Alert) -> impl Future<Output = Result<(), SinkError>> + Send;
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable sender used by the state machines.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistRecord>,
}

impl PersistHandle {
    /// Queue a record. Never blocks; a closed drain is logged and ignored.
    pub fn send(&self, record: PersistRecord) {
        if self.tx.send(record).is_err() {
            warn!("persistence drain is gone; record dropped");
        }
    }
}

/// Create the persistence channel.
pub fn channel() -> (PersistHandle, mpsc::UnboundedReceiver<PersistRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PersistHandle { tx }, rx)
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

/// Records waiting to be written.
#[derive(Debug, Default)]
struct Pending {
    alerts: VecDeque<PersistRecord>,
    ledger: VecDeque<LedgerEntry>,
    sessions: VecDeque<Session>,
    map_states: VecDeque<ZoneMapState>,
}

impl Pending {
    fn len(&self) -> usize {
        self.alerts
            .len()
            .saturating_add(self.ledger.len())
            .saturating_add(self.sessions.len())
            .saturating_add(self.map_states.len())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, record: PersistRecord) {
        match record {
            PersistRecord::Ledger(entry) => self.ledger.push_back(entry),
            PersistRecord::Session(session) => self.sessions.push_back(session),
            PersistRecord::MapState(state) => self.map_states.push_back(state),
            alert @ (PersistRecord::AlertOpened(_) | PersistRecord::AlertClosed(_)) => {
                self.alerts.push_back(alert);
            }
        }
    }

    /// Drop the oldest bulk records until at most `cap` remain. Map state
    /// history goes first; alert records are never shed.
    fn shed(&mut self, cap: usize) -> usize {
        let mut dropped = 0_usize;
        while self.len() > cap {
            let popped = if !self.map_states.is_empty() {
                self.map_states.pop_front().is_some()
            } else if self.ledger.len() >= self.sessions.len() {
                self.ledger.pop_front().is_some()
            } else {
                self.sessions.pop_front().is_some()
            };
            if !popped {
                break;
            }
            dropped = dropped.saturating_add(1);
        }
        dropped
    }
}

/// Totals for one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Ledger entries written.
    pub ledger: usize,
    /// Sessions written.
    pub sessions: usize,
    /// Alert inserts and closes written.
    pub alerts: usize,
    /// Map state history rows written.
    pub map_states: usize,
    /// Records still queued after the flush.
    pub pending: usize,
    /// Whether any write failed.
    pub failed: bool,
}

/// The persistence drain task.
pub struct PersistenceSync<S> {
    sink: S,
    alerts: Arc<AlertManager>,
    health: Arc<ServiceHealthMonitor>,
    clock: Arc<dyn Clock>,
    config: PersistenceConfig,
    pending: Pending,
}

impl<S: RecordSink> PersistenceSync<S> {
    /// Create a drain writing to `sink`. Alert IDs returned by the sink are
    /// handed back to `alerts`.
    pub fn new(
        sink: S,
        alerts: Arc<AlertManager>,
        health: Arc<ServiceHealthMonitor>,
        clock: Arc<dyn Clock>,
        config: PersistenceConfig,
    ) -> Self {
        health.register(names::PERSISTENCE);
        Self {
            sink,
            alerts,
            health,
            clock,
            config,
            pending: Pending::default(),
        }
    }

    /// Queue a record directly (used by tests and the final drain).
    pub fn enqueue(&mut self, record: PersistRecord) {
        self.pending.push(record);
        let dropped = self.pending.shed(self.config.max_pending);
        if dropped > 0 {
            warn!(
                anomaly = "persistence_backlog",
                dropped,
                cap = self.config.max_pending,
                "persistence backlog full; oldest records dropped"
            );
        }
    }

    /// Records currently queued.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Write everything queued, stopping a category at its first failure.
    pub async fn flush(&mut self) -> FlushSummary {
        let mut summary = FlushSummary::default();

        // Alerts: strictly in order.
        while let Some(record) = self.pending.alerts.front() {
            let result = match record {
                PersistRecord::AlertOpened(alert) => match self.sink.open_alert(alert).await {
                    Ok(id) => {
                        self.alerts
                            .assign_id(alert.world_id, alert.zone_id, alert.started_at, id);
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                PersistRecord::AlertClosed(alert) => self.sink.close_alert(alert).await,
                PersistRecord::Ledger(_) | PersistRecord::Session(_) | PersistRecord::MapState(_) => {
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "alert write failed; will retry");
                summary.failed = true;
                break;
            }
            self.pending.alerts.pop_front();
            summary.alerts = summary.alerts.saturating_add(1);
        }

        while !self.pending.ledger.is_empty() {
            let take = self.config.batch_size.max(1).min(self.pending.ledger.len());
            let batch: Vec<LedgerEntry> = self.pending.ledger.iter().take(take).cloned().collect();
            if let Err(e) = self.sink.write_ledger(&batch).await {
                warn!(error = %e, batch = take, "ledger write failed; will retry");
                summary.failed = true;
                break;
            }
            self.pending.ledger.drain(..take);
            summary.ledger = summary.ledger.saturating_add(take);
        }

        while !self.pending.sessions.is_empty() {
            let take = self.config.batch_size.max(1).min(self.pending.sessions.len());
            let batch: Vec<Session> = self.pending.sessions.iter().take(take).cloned().collect();
            if let Err(e) = self.sink.write_sessions(&batch).await {
                warn!(error = %e, batch = take, "session write failed; will retry");
                summary.failed = true;
                break;
            }
            self.pending.sessions.drain(..take);
            summary.sessions = summary.sessions.saturating_add(take);
        }

        while !self.pending.map_states.is_empty() {
            let take = self.config.batch_size.max(1).min(self.pending.map_states.len());
            let batch: Vec<ZoneMapState> =
                self.pending.map_states.iter().take(take).cloned().collect();
            if let Err(e) = self.sink.write_map_states(&batch).await {
                warn!(error = %e, batch = take, "map state write failed; will retry");
                summary.failed = true;
                break;
            }
            self.pending.map_states.drain(..take);
            summary.map_states = summary.map_states.saturating_add(take);
        }

        summary.pending = self.pending.len();
        summary
    }

    async fn flush_and_record(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let started = Instant::now();
        let ran_at = self.clock.now();
        let summary = self.flush().await;
        debug!(
            ledger = summary.ledger,
            sessions = summary.sessions,
            alerts = summary.alerts,
            map_states = summary.map_states,
            pending = summary.pending,
            "persistence flush"
        );
        self.health.record_run(
            names::PERSISTENCE,
            ran_at,
            started.elapsed(),
            format!(
                "ledger={} sessions={} alerts={} map_states={} pending={}{}",
                summary.ledger,
                summary.sessions,
                summary.alerts,
                summary.map_states,
                summary.pending,
                if summary.failed { " (write failed)" } else { "" }
            ),
        );
    }

    /// Drain `rx` until `stop` is triggered, then write everything still
    /// queued (including records sent just before the stop).
    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<PersistRecord>,
        stop: Arc<ShutdownSignal>,
    ) {
        info!("persistence drain started");
        let interval = self.config.flush_interval();
        let mut next_flush = tokio::time::Instant::now() + interval;

        loop {
            if stop.is_triggered() {
                break;
            }
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                record = rx.recv() => match record {
                    Some(record) => self.enqueue(record),
                    None => break,
                },
                () = tokio::time::sleep_until(next_flush) => {}
            }

            let due = tokio::time::Instant::now() >= next_flush;
            if due || self.pending.len() >= self.config.batch_size {
                if self.health.is_enabled(names::PERSISTENCE) {
                    self.flush_and_record().await;
                }
                next_flush = tokio::time::Instant::now() + interval;
            }
        }

        while let Ok(record) = rx.try_recv() {
            self.enqueue(record);
        }
        self.flush_and_record().await;
        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "records left unwritten at shutdown");
        }
        info!("persistence drain stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    use chrono::{DateTime, TimeZone, Utc};
    use frontline_types::{
        AlertReason, CharacterId, FacilityId, FactionId, LedgerOutcome, WorldId, ZoneId,
    };
    use frontline_world::{FacilityCatalog, MapStore};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AlertConfig;

    /// In-memory sink with a switchable failure mode.
    #[derive(Debug, Default)]
    pub(crate) struct MemorySink {
        pub ledger: Mutex<Vec<LedgerEntry>>,
        pub sessions: Mutex<Vec<Session>>,
        pub opened: Mutex<Vec<Alert>>,
        pub closed: Mutex<Vec<Alert>>,
        pub map_states: Mutex<Vec<ZoneMapState>>,
        pub failing: AtomicBool,
        next_id: AtomicI64,
    }

    impl MemorySink {
        fn check(&self) -> Result<(), SinkError> {
            if self.failing.load(Ordering::Acquire) {
                Err(SinkError::Storage(String::from("down")))
            } else {
                Ok(())
            }
        }
    }

    impl RecordSink for Arc<MemorySink> {
        async fn write_ledger(&self, entries: &[LedgerEntry]) -> Result<(), SinkError> {
            self.check()?;
            self.ledger.lock().unwrap().extend_from_slice(entries);
            Ok(())
        }

        async fn write_sessions(&self, sessions: &[Session]) -> Result<(), SinkError> {
            self.check()?;
            self.sessions.lock().unwrap().extend_from_slice(sessions);
            Ok(())
        }

        async fn write_map_states(&self, states: &[ZoneMapState]) -> Result<(), SinkError> {
            self.check()?;
            self.map_states.lock().unwrap().extend_from_slice(states);
            Ok(())
        }

        async fn open_alert(&self, alert: &Alert) -> Result<AlertId, SinkError> {
            self.check()?;
            self.opened.lock().unwrap().push(alert.clone());
            Ok(AlertId::new(self.next_id.fetch_add(1, Ordering::AcqRel) + 1))
        }

        async fn close_alert(&self, alert: &Alert) -> Result<(), SinkError> {
            self.check()?;
            self.closed.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(secs: i64) -> LedgerEntry {
        LedgerEntry {
            facility_id: FacilityId::new(100),
            zone_id: ZoneId::new(2),
            world_id: WorldId::new(1),
            outcome: LedgerOutcome::Captured,
            faction_id: FactionId::new(2),
            previous_faction_id: FactionId::new(1),
            timestamp: at(secs),
        }
    }

    fn alert() -> Alert {
        Alert {
            id: None,
            world_id: WorldId::new(1),
            zone_id: ZoneId::new(2),
            started_at: at(0),
            duration_secs: 900,
            reason: AlertReason::Restored,
        }
    }

    fn map_state(secs: i64) -> ZoneMapState {
        ZoneMapState {
            world_id: WorldId::new(1),
            zone_id: ZoneId::new(2),
            recorded_at: at(secs),
            players: Some(40),
            owners: vec![(FacilityId::new(100), FactionId::new(2))],
        }
    }

    fn drain(
        sink: &Arc<MemorySink>,
        config: PersistenceConfig,
    ) -> (PersistenceSync<Arc<MemorySink>>, Arc<AlertManager>) {
        drain_with_health(sink, config, Arc::new(ServiceHealthMonitor::new()))
    }

    fn drain_with_health(
        sink: &Arc<MemorySink>,
        config: PersistenceConfig,
        health: Arc<ServiceHealthMonitor>,
    ) -> (PersistenceSync<Arc<MemorySink>>, Arc<AlertManager>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(at(0)));
        let store = Arc::new(MapStore::new(Arc::new(FacilityCatalog::new())));
        let (handle, _rx) = channel();
        let alerts = Arc::new(AlertManager::new(
            AlertConfig::default(),
            store,
            Arc::clone(&clock),
            handle,
        ));
        let sync = PersistenceSync::new(Arc::clone(sink), Arc::clone(&alerts), health, clock, config);
        (sync, alerts)
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let sink = Arc::new(MemorySink::default());
        let config = PersistenceConfig {
            batch_size: 2,
            ..PersistenceConfig::default()
        };
        let (mut sync, _) = drain(&sink, config);
        for i in 0..5 {
            sync.enqueue(PersistRecord::Ledger(entry(i)));
        }
        let summary = sync.flush().await;
        assert_eq!(summary.ledger, 5);
        assert_eq!(summary.pending, 0);
        assert_eq!(sink.ledger.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failed_writes_are_retried() {
        let sink = Arc::new(MemorySink::default());
        let (mut sync, _) = drain(&sink, PersistenceConfig::default());
        sync.enqueue(PersistRecord::Ledger(entry(0)));
        sync.enqueue(PersistRecord::Session(Session::open(
            CharacterId::new(7),
            WorldId::new(1),
            at(0),
        )));

        sink.failing.store(true, Ordering::Release);
        let summary = sync.flush().await;
        assert!(summary.failed);
        assert_eq!(sync.pending(), 2);

        sink.failing.store(false, Ordering::Release);
        let summary = sync.flush().await;
        assert!(!summary.failed);
        assert_eq!(summary.ledger, 1);
        assert_eq!(summary.sessions, 1);
        assert_eq!(sync.pending(), 0);
    }

    #[tokio::test]
    async fn backlog_is_capped() {
        let sink = Arc::new(MemorySink::default());
        let config = PersistenceConfig {
            max_pending: 3,
            ..PersistenceConfig::default()
        };
        let (mut sync, _) = drain(&sink, config);
        for i in 0..10 {
            sync.enqueue(PersistRecord::Ledger(entry(i)));
        }
        assert_eq!(sync.pending(), 3);
        sync.flush().await;
        let written = sink.ledger.lock().unwrap();
        assert_eq!(written.first().map(|e| e.timestamp), Some(at(7)));
    }

    #[tokio::test]
    async fn alert_close_waits_for_insert() {
        let sink = Arc::new(MemorySink::default());
        let (mut sync, alerts) = drain(&sink, PersistenceConfig::default());
        assert!(alerts.restore(alert()));
        sync.enqueue(PersistRecord::AlertOpened(alert()));
        sync.enqueue(PersistRecord::AlertClosed(alert()));

        sink.failing.store(true, Ordering::Release);
        sync.flush().await;
        assert!(sink.closed.lock().unwrap().is_empty());
        assert_eq!(sync.pending(), 2);

        sink.failing.store(false, Ordering::Release);
        let summary = sync.flush().await;
        assert_eq!(summary.alerts, 2);
        assert_eq!(sink.opened.lock().unwrap().len(), 1);
        assert_eq!(sink.closed.lock().unwrap().len(), 1);

        let current = alerts.current_alert(WorldId::new(1), ZoneId::new(2));
        assert_eq!(current.and_then(|a| a.id), Some(AlertId::new(1)));
    }

    #[tokio::test]
    async fn run_flushes_on_stop() {
        let sink = Arc::new(MemorySink::default());
        let (sync, _) = drain(&sink, PersistenceConfig::default());
        let (handle, rx) = channel();
        let stop = Arc::new(ShutdownSignal::new());
        let task = tokio::spawn(sync.run(rx, Arc::clone(&stop)));

        handle.send(PersistRecord::Ledger(entry(1)));
        handle.send(PersistRecord::Ledger(entry(2)));
        stop.trigger();
        task.await.unwrap();

        assert_eq!(sink.ledger.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn map_states_are_written_in_batches() {
        let sink = Arc::new(MemorySink::default());
        let config = PersistenceConfig {
            batch_size: 2,
            ..PersistenceConfig::default()
        };
        let (mut sync, _) = drain(&sink, config);
        for i in 0..3 {
            sync.enqueue(PersistRecord::MapState(map_state(i)));
        }
        let summary = sync.flush().await;
        assert_eq!(summary.map_states, 3);
        assert_eq!(summary.pending, 0);
        let written = sink.map_states.lock().unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written.last().map(|s| s.recorded_at), Some(at(2)));
    }

    #[tokio::test]
    async fn map_state_history_is_shed_before_ledger() {
        let sink = Arc::new(MemorySink::default());
        let config = PersistenceConfig {
            max_pending: 2,
            ..PersistenceConfig::default()
        };
        let (mut sync, _) = drain(&sink, config);
        sync.enqueue(PersistRecord::Ledger(entry(0)));
        sync.enqueue(PersistRecord::MapState(map_state(1)));
        sync.enqueue(PersistRecord::Ledger(entry(2)));
        assert_eq!(sync.pending(), 2);

        sync.flush().await;
        assert_eq!(sink.ledger.lock().unwrap().len(), 2);
        assert!(sink.map_states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn paused_drain_holds_records_until_enabled() {
        let sink = Arc::new(MemorySink::default());
        let health = Arc::new(ServiceHealthMonitor::new());
        let config = PersistenceConfig {
            flush_interval_ms: 5,
            ..PersistenceConfig::default()
        };
        let (sync, _) = drain_with_health(&sink, config, Arc::clone(&health));
        health.set_enabled(names::PERSISTENCE, false);
        let (handle, rx) = channel();
        let stop = Arc::new(ShutdownSignal::new());
        let task = tokio::spawn(sync.run(rx, Arc::clone(&stop)));

        handle.send(PersistRecord::Ledger(entry(1)));
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(sink.ledger.lock().unwrap().is_empty());
        assert!(health.get(names::PERSISTENCE).unwrap().last_ran.is_none());

        health.set_enabled(names::PERSISTENCE, true);
        for _ in 0..100 {
            if !sink.ledger.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(sink.ledger.lock().unwrap().len(), 1);

        stop.trigger();
        task.await.unwrap();
    }
}
