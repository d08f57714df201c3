//! Alert lifecycle: one Idle/Active state machine per (world, zone).
//!
//! A zone goes Idle → Active when its windowed instability count exceeds the
//! configured threshold while its population exceeds the configured
//! minimum. An Active alert runs for exactly its duration; it is never
//! extended, and it is finalized (handed to persistence, instability reset)
//! by whichever comes first: the sweep loop, or the next instability
//! notification for the zone.
//!
//! Lock order: the alert table lock is taken before a zone lock, never the
//! other way round. The tracker releases its zone lock before notifying.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use frontline_types::{Alert, AlertId, AlertReason, WorldId, ZoneId};
use frontline_world::MapStore;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::AlertConfig;
use crate::error::AlertQueryError;
use crate::health::{ServiceHealthMonitor, names};
use crate::persist::{PersistHandle, PersistRecord};
use crate::shutdown::ShutdownSignal;

/// Per-zone alert state.
#[derive(Debug, Clone, Default)]
struct ZoneAlert {
    /// Last reported population.
    population: u32,
    /// The running alert, if any.
    active: Option<Alert>,
}

/// Result of feeding the manager a new instability or population value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTransition {
    /// Nothing changed.
    Unchanged,
    /// A new alert was opened.
    Opened(Alert),
}

/// Owner of every running alert.
pub struct AlertManager {
    config: AlertConfig,
    store: Arc<MapStore>,
    clock: Arc<dyn Clock>,
    persist: PersistHandle,
    zones: Mutex<BTreeMap<(WorldId, ZoneId), ZoneAlert>>,
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AlertManager {
    /// Create a manager with every zone Idle.
    pub fn new(
        config: AlertConfig,
        store: Arc<MapStore>,
        clock: Arc<dyn Clock>,
        persist: PersistHandle,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            persist,
            zones: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(WorldId, ZoneId), ZoneAlert>> {
        // A panic mid-update can at worst leave a stale `active` entry, which
        // the next sweep finalizes.
        self.zones.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finalize `state.active` if its time is up. Returns the closed alert.
    fn close_if_due(
        &self,
        world: WorldId,
        zone: ZoneId,
        state: &mut ZoneAlert,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if !state.active.as_ref().is_some_and(|a| a.is_finished(now)) {
            return None;
        }
        let alert = state.active.take()?;
        info!(
            world = %world,
            zone = %zone,
            alert_id = ?alert.id,
            started_at = %alert.started_at,
            "alert finished"
        );
        self.persist.send(PersistRecord::AlertClosed(alert.clone()));
        if let Err(e) = self.store.with_zone_mut(world, zone, |z| z.reset_instability()) {
            warn!(world = %world, zone = %zone, error = %e, "could not reset instability");
        }
        Some(alert)
    }

    /// Open an alert if the zone is Idle and both thresholds are exceeded.
    fn maybe_open(
        &self,
        world: WorldId,
        zone: ZoneId,
        state: &mut ZoneAlert,
        instability: u32,
        now: DateTime<Utc>,
    ) -> AlertTransition {
        if state.active.is_some()
            || instability <= self.config.instability_threshold
            || state.population <= self.config.min_population
        {
            return AlertTransition::Unchanged;
        }
        let alert = Alert {
            id: None,
            world_id: world,
            zone_id: zone,
            started_at: now,
            duration_secs: self.config.duration_secs,
            reason: AlertReason::Instability {
                events: instability,
                population: state.population,
            },
        };
        info!(
            world = %world,
            zone = %zone,
            instability,
            population = state.population,
            ends_at = %alert.ends_at(),
            "alert started"
        );
        state.active = Some(alert.clone());
        self.persist.send(PersistRecord::AlertOpened(alert.clone()));
        if let Err(e) = self.store.with_zone_mut(world, zone, |z| z.reset_instability()) {
            warn!(world = %world, zone = %zone, error = %e, "could not reset instability");
        }
        AlertTransition::Opened(alert)
    }

    // -------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------

    /// The zone's windowed instability count changed.
    pub fn on_instability(&self, world: WorldId, zone: ZoneId, instability: u32) -> AlertTransition {
        let now = self.clock.now();
        let mut zones = self.lock();
        let state = zones.entry((world, zone)).or_default();
        if self.close_if_due(world, zone, state, now).is_some() {
            // The count that triggered this call predates the reset.
            return AlertTransition::Unchanged;
        }
        self.maybe_open(world, zone, state, instability, now)
    }

    /// Record a new population figure and re-evaluate the trigger against
    /// the zone's current instability count.
    pub fn update_population(&self, world: WorldId, zone: ZoneId, players: u32) -> AlertTransition {
        let now = self.clock.now();
        let mut zones = self.lock();
        let state = zones.entry((world, zone)).or_default();
        state.population = players;
        self.close_if_due(world, zone, state, now);
        if state.active.is_some() {
            return AlertTransition::Unchanged;
        }
        let window = self.config.window();
        let instability = self
            .store
            .with_zone_mut(world, zone, |z| z.instability_count(now, window))
            .unwrap_or_else(|e| {
                warn!(world = %world, zone = %zone, error = %e, "could not read instability");
                0
            });
        self.maybe_open(world, zone, state, instability, now)
    }

    /// Reinstate an alert loaded from durable storage. Returns `false` if
    /// it has already finished or the zone has a running alert.
    pub fn restore(&self, alert: Alert) -> bool {
        let now = self.clock.now();
        if alert.is_finished(now) {
            return false;
        }
        let mut zones = self.lock();
        let state = zones.entry((alert.world_id, alert.zone_id)).or_default();
        if state.active.is_some() {
            warn!(
                anomaly = "duplicate_restored_alert",
                world = %alert.world_id,
                zone = %alert.zone_id,
                "zone already has a running alert"
            );
            return false;
        }
        info!(
            world = %alert.world_id,
            zone = %alert.zone_id,
            alert_id = ?alert.id,
            ends_at = %alert.ends_at(),
            "alert restored"
        );
        state.active = Some(alert);
        true
    }

    /// Attach the durable ID returned by storage to a running alert.
    pub fn assign_id(&self, world: WorldId, zone: ZoneId, started_at: DateTime<Utc>, id: AlertId) {
        let mut zones = self.lock();
        if let Some(alert) = zones
            .get_mut(&(world, zone))
            .and_then(|s| s.active.as_mut())
            .filter(|a| a.started_at == started_at)
        {
            alert.id = Some(id);
        }
    }

    // -------------------------------------------------------------------
    // Sweep
    // -------------------------------------------------------------------

    /// Finalize every alert whose duration has elapsed.
    pub fn sweep(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let mut zones = self.lock();
        let mut closed = Vec::new();
        for ((world, zone), state) in zones.iter_mut() {
            if let Some(alert) = self.close_if_due(*world, *zone, state, now) {
                closed.push(alert);
            }
        }
        closed
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// The running alert for a zone, `None` once it has reached its end
    /// even if the sweep has not finalized it yet.
    pub fn current_alert(&self, world: WorldId, zone: ZoneId) -> Option<Alert> {
        let now = self.clock.now();
        let zones = self.lock();
        zones
            .get(&(world, zone))
            .and_then(|s| s.active.as_ref())
            .filter(|a| !a.is_finished(now))
            .cloned()
    }

    /// Every running alert.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let zones = self.lock();
        zones
            .values()
            .filter_map(|s| s.active.as_ref())
            .filter(|a| !a.is_finished(now))
            .cloned()
            .collect()
    }

    /// Whether `alert` has reached `start + duration`.
    pub fn is_alert_finished(&self, alert: &Alert) -> bool {
        alert.is_finished(self.clock.now())
    }

    /// Reject queries that need a finished alert.
    pub fn ensure_finished(&self, alert: &Alert) -> Result<(), AlertQueryError> {
        if self.is_alert_finished(alert) {
            Ok(())
        } else {
            Err(AlertQueryError::NotFinished {
                ends_at: alert.ends_at(),
            })
        }
    }
}

/// Run the sweep loop until `shutdown` fires. Running alerts are left alone
/// at shutdown; they are restored from storage on the next start.
pub async fn run_sweep(
    alerts: Arc<AlertManager>,
    health: Arc<ServiceHealthMonitor>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: Arc<ShutdownSignal>,
) {
    health.register(names::ALERT_SWEEP);
    info!(interval_ms = interval.as_millis(), "alert sweep started");
    loop {
        if shutdown.is_triggered() {
            break;
        }
        if health.is_enabled(names::ALERT_SWEEP) {
            let started = Instant::now();
            let ran_at = clock.now();
            let closed = alerts.sweep();
            health.record_run(
                names::ALERT_SWEEP,
                ran_at,
                started.elapsed(),
                format!("finalized={}", closed.len()),
            );
        }
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    info!("alert sweep stopped");
}
