//! Live event ingestion, sharded by world.
//!
//! The transport adapter hands every parsed [`GameEvent`] to the
//! [`IngestRouter`], which forwards it to a per-world consumer task over a
//! bounded channel. Each consumer applies its world's events in arrival
//! order, so per-facility ordering holds, while different worlds run in
//! parallel and a failure in one world's consumer never touches another.
//! A consumer that died is respawned on the next event for its world.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use frontline_types::{GameEvent, WorldId};
use frontline_world::{MapStore, WorldError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::health::{ServiceHealthMonitor, names};
use crate::sessions::{LoginOutcome, LogoutOutcome, SessionTracker};
use crate::shutdown::ShutdownSignal;
use crate::tracker::{ControlOutcome, FacilityTracker};

/// Upper bound on events a consumer processes before yielding.
const MAX_BATCH: usize = 256;

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A control event was processed.
    Control(ControlOutcome),
    /// A login was processed.
    Login(LoginOutcome),
    /// A logout was processed.
    Logout(LogoutOutcome),
    /// The event hit a poisoned zone; the zone was rebuilt and the event
    /// dropped. The next reconciliation restores the zone.
    ZoneRebuilt,
}

impl EventOutcome {
    /// Whether the event changed state.
    pub const fn is_applied(&self) -> bool {
        matches!(
            self,
            Self::Control(ControlOutcome::Applied { .. })
                | Self::Login(LoginOutcome::Opened | LoginOutcome::Reopened { .. })
                | Self::Logout(LogoutOutcome::Closed(_))
        )
    }
}

/// Dispatches events to the ownership tracker and session tracker.
#[derive(Debug)]
pub struct EventProcessor {
    tracker: Arc<FacilityTracker>,
    sessions: Arc<SessionTracker>,
    store: Arc<MapStore>,
}

impl EventProcessor {
    /// Create a processor.
    pub const fn new(
        tracker: Arc<FacilityTracker>,
        sessions: Arc<SessionTracker>,
        store: Arc<MapStore>,
    ) -> Self {
        Self {
            tracker,
            sessions,
            store,
        }
    }

    /// Process one event synchronously.
    pub fn process(&self, event: &GameEvent) -> EventOutcome {
        match event {
            GameEvent::Control(control) => match self.tracker.apply(control) {
                Ok(outcome) => EventOutcome::Control(outcome),
                Err(WorldError::ZonePoisoned { world, zone }) => {
                    error!(world = %world, zone = %zone, "zone poisoned; rebuilding");
                    if let Err(e) = self.store.rebuild_zone(world, zone) {
                        error!(world = %world, zone = %zone, error = %e, "zone rebuild failed");
                    }
                    EventOutcome::ZoneRebuilt
                }
                Err(e) => {
                    error!(world = %control.world_id, error = %e, "control event failed");
                    EventOutcome::ZoneRebuilt
                }
            },
            GameEvent::Login(presence) => EventOutcome::Login(self.sessions.on_login(presence)),
            GameEvent::Logout(presence) => EventOutcome::Logout(self.sessions.on_logout(presence)),
        }
    }
}

/// Consumer loop for one world.
async fn consume(
    world: WorldId,
    mut rx: mpsc::Receiver<GameEvent>,
    processor: Arc<EventProcessor>,
    health: Arc<ServiceHealthMonitor>,
    clock: Arc<dyn Clock>,
    disabled_retry: Duration,
    shutdown: Arc<ShutdownSignal>,
) {
    debug!(world = %world, "event consumer started");
    let mut batch = Vec::with_capacity(MAX_BATCH);
    loop {
        if shutdown.is_triggered() {
            break;
        }
        if !health.is_enabled(names::INGEST) {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(disabled_retry) => continue,
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            received = rx.recv_many(&mut batch, MAX_BATCH) => {
                if received == 0 {
                    break;
                }
            }
        }

        let started = Instant::now();
        let ran_at = clock.now();
        let mut applied = 0_usize;
        for event in batch.drain(..) {
            if processor.process(&event).is_applied() {
                applied = applied.saturating_add(1);
            }
        }
        health.record_run(
            names::INGEST,
            ran_at,
            started.elapsed(),
            format!("world={world} applied={applied}"),
        );
    }
    debug!(world = %world, "event consumer stopped");
}

/// Routes events to per-world consumers.
pub struct IngestRouter {
    processor: Arc<EventProcessor>,
    health: Arc<ServiceHealthMonitor>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    disabled_retry: Duration,
    shutdown: Arc<ShutdownSignal>,
    consumers: Mutex<BTreeMap<WorldId, mpsc::Sender<GameEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for IngestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestRouter")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl IngestRouter {
    /// Create a router. Consumers are spawned lazily per world.
    pub fn new(
        processor: Arc<EventProcessor>,
        health: Arc<ServiceHealthMonitor>,
        clock: Arc<dyn Clock>,
        capacity: usize,
        disabled_retry: Duration,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        health.register(names::INGEST);
        Self {
            processor,
            health,
            clock,
            capacity: capacity.max(1),
            disabled_retry,
            shutdown,
            consumers: Mutex::new(BTreeMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn spawn_consumer(&self, world: WorldId) -> mpsc::Sender<GameEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = tokio::spawn(consume(
            world,
            rx,
            Arc::clone(&self.processor),
            Arc::clone(&self.health),
            Arc::clone(&self.clock),
            self.disabled_retry,
            Arc::clone(&self.shutdown),
        ));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        info!(world = %world, "event consumer spawned");
        tx
    }

    fn sender(&self, world: WorldId, replace: bool) -> mpsc::Sender<GameEvent> {
        let mut consumers = self.consumers.lock().unwrap_or_else(PoisonError::into_inner);
        if !replace && let Some(tx) = consumers.get(&world) {
            return tx.clone();
        }
        let tx = self.spawn_consumer(world);
        consumers.insert(world, tx.clone());
        tx
    }

    /// Forward one event to its world's consumer, waiting for channel
    /// space. Events routed after shutdown are dropped.
    pub async fn route(&self, event: GameEvent) {
        if self.shutdown.is_triggered() {
            return;
        }
        let world = event.world_id();
        let tx = self.sender(world, false);
        let Err(mpsc::error::SendError(event)) = tx.send(event).await else {
            return;
        };
        if self.shutdown.is_triggered() {
            return;
        }
        error!(world = %world, "event consumer died; respawning");
        let tx = self.sender(world, true);
        if tx.send(event).await.is_err() {
            error!(world = %world, "respawned consumer rejected event");
        }
    }

    /// Worlds with a consumer.
    pub fn worlds(&self) -> Vec<WorldId> {
        self.consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Wait for every consumer to exit. Call after triggering shutdown.
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "event consumer panicked");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use frontline_types::{
        CharacterId, ControlEvent, FacilityId, FacilityMetadata, FactionId, PresenceEvent, ZoneId,
    };
    use frontline_world::FacilityCatalog;

    use super::*;
    use crate::alerts::AlertManager;
    use crate::clock::ManualClock;
    use crate::config::AlertConfig;
    use crate::persist;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn setup() -> (Arc<EventProcessor>, Arc<MapStore>, Arc<SessionTracker>, Arc<dyn Clock>) {
        let catalog = FacilityCatalog::from_parts(
            vec![FacilityMetadata {
                facility_id: FacilityId::new(100),
                zone_id: ZoneId::new(2),
                name: String::from("Hvar"),
                type_id: 2,
                type_name: String::from("Amp Station"),
            }],
            &[],
        );
        let store = Arc::new(MapStore::new(Arc::new(catalog)));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(at(0)));
        let (handle, _rx) = persist::channel();
        let alerts = Arc::new(AlertManager::new(
            AlertConfig::default(),
            Arc::clone(&store),
            Arc::clone(&clock),
            handle.clone(),
        ));
        let tracker = Arc::new(FacilityTracker::new(
            Arc::clone(&store),
            alerts,
            handle.clone(),
            Arc::clone(&clock),
            TimeDelta::seconds(300),
        ));
        let sessions = Arc::new(SessionTracker::new(handle, TimeDelta::seconds(300)));
        let processor = Arc::new(EventProcessor::new(
            tracker,
            Arc::clone(&sessions),
            Arc::clone(&store),
        ));
        (processor, store, sessions, clock)
    }

    fn control(world: u16, faction: u8, secs: i64) -> GameEvent {
        GameEvent::Control(ControlEvent {
            world_id: WorldId::new(world),
            zone_id: ZoneId::new(2),
            facility_id: FacilityId::new(100),
            faction_id: FactionId::new(faction),
            timestamp: at(secs),
        })
    }

    #[test]
    fn processor_dispatches_by_kind() {
        let (processor, _store, sessions, _clock) = setup();
        assert!(processor.process(&control(1, 2, 0)).is_applied());

        let login = GameEvent::Login(PresenceEvent {
            character_id: CharacterId::new(5),
            world_id: WorldId::new(1),
            timestamp: at(0),
        });
        assert_eq!(processor.process(&login), EventOutcome::Login(LoginOutcome::Opened));
        assert!(sessions.open_session(CharacterId::new(5), WorldId::new(1)).is_some());
    }

    #[test]
    fn poisoned_zone_is_rebuilt_by_processor() {
        let (processor, store, _sessions, _clock) = setup();
        processor.process(&control(1, 2, 0));
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _ = poisoner.with_zone_mut(WorldId::new(1), ZoneId::new(2), |_| -> u8 {
                panic!("writer died")
            });
        })
        .join();

        assert_eq!(processor.process(&control(1, 3, 1)), EventOutcome::ZoneRebuilt);
        assert!(processor.process(&control(1, 3, 2)).is_applied());
    }

    #[tokio::test]
    async fn router_preserves_per_world_order() {
        let (processor, store, _sessions, clock) = setup();
        let health = Arc::new(ServiceHealthMonitor::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let router = IngestRouter::new(
            processor,
            Arc::clone(&health),
            clock,
            8,
            Duration::from_millis(5),
            Arc::clone(&shutdown),
        );

        for (i, faction) in [1_u8, 2, 3, 1, 2].into_iter().enumerate() {
            let secs = i64::try_from(i).unwrap();
            router.route(control(1, faction, secs)).await;
            router.route(control(17, faction, secs)).await;
        }
        // Give consumers a moment to drain.
        for _ in 0..50 {
            let done = [1_u16, 17].iter().all(|w| {
                store
                    .owner(WorldId::new(*w), ZoneId::new(2), FacilityId::new(100))
                    .unwrap()
                    == Some(FactionId::new(2))
            });
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(router.worlds(), vec![WorldId::new(1), WorldId::new(17)]);
        for world in [1_u16, 17] {
            assert_eq!(
                store
                    .owner(WorldId::new(world), ZoneId::new(2), FacilityId::new(100))
                    .unwrap(),
                Some(FactionId::new(2))
            );
        }

        shutdown.trigger();
        router.join().await;
        assert!(health.get(names::INGEST).unwrap().last_ran.is_some());
    }

    #[tokio::test]
    async fn disabled_ingest_holds_events_until_reenabled() {
        let (processor, store, _sessions, clock) = setup();
        let health = Arc::new(ServiceHealthMonitor::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let router = IngestRouter::new(
            processor,
            Arc::clone(&health),
            clock,
            8,
            Duration::from_millis(5),
            Arc::clone(&shutdown),
        );
        let owner = || {
            store
                .owner(WorldId::new(1), ZoneId::new(2), FacilityId::new(100))
                .unwrap()
        };

        assert!(health.set_enabled(names::INGEST, false).is_some());
        router.route(control(1, 3, 0)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(owner(), Some(FactionId::NEUTRAL));
        assert!(health.get(names::INGEST).unwrap().last_ran.is_none());

        assert!(health.set_enabled(names::INGEST, true).is_some());
        for _ in 0..100 {
            if owner() == Some(FactionId::new(3)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(owner(), Some(FactionId::new(3)));
        assert!(health.get(names::INGEST).unwrap().last_ran.is_some());

        shutdown.trigger();
        router.join().await;
    }
}
