//! Wiring and lifecycle for the live state machines.
//!
//! [`FrontlineCore`] builds every component around one shared
//! [`MapStore`] and persistence channel. [`Runtime::start`] spawns the
//! background loops (reconciliation poller, alert sweep, persistence drain)
//! and [`Runtime::shutdown`] stops them in order:
//!
//! 1. stop ingestion, reconciliation, and the sweep,
//! 2. force-close every open session,
//! 3. stop the persistence drain, which writes everything still queued.
//!
//! Running alerts are not closed at shutdown.

use std::sync::Arc;

use frontline_types::Alert;
use frontline_world::{FacilityCatalog, MapStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::alerts::{self, AlertManager};
use crate::clock::Clock;
use crate::config::FrontlineConfig;
use crate::health::ServiceHealthMonitor;
use crate::ingest::{EventProcessor, IngestRouter};
use crate::persist::{self, PersistHandle, PersistRecord, PersistenceSync, RecordSink};
use crate::reconcile::{ReconciliationPoller, SnapshotSource};
use crate::sessions::SessionTracker;
use crate::shutdown::ShutdownSignal;
use crate::tracker::FacilityTracker;

/// Receiving end of the persistence channel, consumed by [`Runtime::start`].
#[derive(Debug)]
pub struct PersistQueue(mpsc::UnboundedReceiver<PersistRecord>);

/// Shared handles to every live component.
#[derive(Clone)]
pub struct FrontlineCore {
    /// Loaded configuration.
    pub config: Arc<FrontlineConfig>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Ownership store.
    pub store: Arc<MapStore>,
    /// Alert lifecycle manager.
    pub alerts: Arc<AlertManager>,
    /// Session tracker.
    pub sessions: Arc<SessionTracker>,
    /// Ownership tracker.
    pub tracker: Arc<FacilityTracker>,
    /// Service health registry.
    pub health: Arc<ServiceHealthMonitor>,
    /// Event router for the transport adapter.
    pub router: Arc<IngestRouter>,
    /// Sender feeding the persistence drain.
    pub persist: PersistHandle,
    /// Signal stopping ingestion, reconciliation, and the sweep.
    pub shutdown: Arc<ShutdownSignal>,
}

impl std::fmt::Debug for FrontlineCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontlineCore").finish_non_exhaustive()
    }
}

impl FrontlineCore {
    /// Build every component. Must be called inside a Tokio runtime.
    pub fn new(
        config: FrontlineConfig,
        catalog: FacilityCatalog,
        clock: Arc<dyn Clock>,
    ) -> (Self, PersistQueue) {
        let (handle, rx) = persist::channel();
        let store = Arc::new(MapStore::new(Arc::new(catalog)));
        let health = Arc::new(ServiceHealthMonitor::new());
        let shutdown = Arc::new(ShutdownSignal::new());

        let alerts = Arc::new(AlertManager::new(
            config.alerts.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
            handle.clone(),
        ));
        let sessions = Arc::new(SessionTracker::new(
            handle.clone(),
            config.sessions.grace_period(),
        ));
        let tracker = Arc::new(FacilityTracker::new(
            Arc::clone(&store),
            Arc::clone(&alerts),
            handle.clone(),
            Arc::clone(&clock),
            config.alerts.window(),
        ));
        let processor = Arc::new(EventProcessor::new(
            Arc::clone(&tracker),
            Arc::clone(&sessions),
            Arc::clone(&store),
        ));
        let router = Arc::new(IngestRouter::new(
            processor,
            Arc::clone(&health),
            Arc::clone(&clock),
            config.tracker.event_channel_capacity,
            config.reconciliation.disabled_retry(),
            Arc::clone(&shutdown),
        ));

        let core = Self {
            config: Arc::new(config),
            clock,
            store,
            alerts,
            sessions,
            tracker,
            health,
            router,
            persist: handle,
            shutdown,
        };
        (core, PersistQueue(rx))
    }

    /// Reinstate unfinished alerts loaded from storage. Returns how many
    /// were restored.
    pub fn restore_alerts(&self, unfinished: Vec<Alert>) -> usize {
        unfinished
            .into_iter()
            .filter(|alert| self.alerts.restore(alert.clone()))
            .count()
    }
}

/// The running background loops.
#[derive(Debug)]
pub struct Runtime {
    core: FrontlineCore,
    persist_stop: Arc<ShutdownSignal>,
    reconcile: JoinHandle<()>,
    sweep: JoinHandle<()>,
    persist: JoinHandle<()>,
}

impl Runtime {
    /// Spawn the reconciliation poller, alert sweep, and persistence drain.
    pub fn start<S, K>(core: FrontlineCore, queue: PersistQueue, source: S, sink: K) -> Self
    where
        S: SnapshotSource + 'static,
        K: RecordSink + 'static,
    {
        let persist_stop = Arc::new(ShutdownSignal::new());

        let drain = PersistenceSync::new(
            sink,
            Arc::clone(&core.alerts),
            Arc::clone(&core.health),
            Arc::clone(&core.clock),
            core.config.persistence.clone(),
        );
        let persist = tokio::spawn(drain.run(queue.0, Arc::clone(&persist_stop)));

        let poller = ReconciliationPoller::new(
            source,
            Arc::clone(&core.store),
            Arc::clone(&core.sessions),
            Arc::clone(&core.alerts),
            Arc::clone(&core.health),
            core.persist.clone(),
            Arc::clone(&core.clock),
            core.config.reconciliation.clone(),
        );
        let reconcile = tokio::spawn(poller.run(Arc::clone(&core.shutdown)));

        let sweep = tokio::spawn(alerts::run_sweep(
            Arc::clone(&core.alerts),
            Arc::clone(&core.health),
            Arc::clone(&core.clock),
            core.config.alerts.sweep_interval(),
            Arc::clone(&core.shutdown),
        ));

        info!("background loops started");
        Self {
            core,
            persist_stop,
            reconcile,
            sweep,
            persist,
        }
    }

    /// Shared handles.
    pub const fn core(&self) -> &FrontlineCore {
        &self.core
    }

    /// Stop every loop, close open sessions, and flush persistence.
    /// Returns how many sessions were force-closed.
    pub async fn shutdown(self) -> usize {
        info!("shutting down");
        self.core.shutdown.trigger();
        self.core.router.join().await;
        for (name, task) in [("reconciliation", self.reconcile), ("alert_sweep", self.sweep)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "background loop panicked");
            }
        }

        let closed = self.core.sessions.close_all(self.core.clock.now());
        info!(sessions = closed, "open sessions closed");

        self.persist_stop.trigger();
        if let Err(e) = self.persist.await {
            error!(error = %e, "persistence drain panicked");
        }
        info!("shutdown complete");
        closed
    }
}
