//! Reconciliation poller: periodic authoritative snapshot, drift correction.
//!
//! Every pass fetches a full [`MapSnapshot`] and:
//!
//! 1. overwrites facility owners that differ from the snapshot (logged as
//!    drift, never as ledger entries),
//! 2. aligns open sessions with the online set,
//! 3. feeds zone populations to the alert manager,
//! 4. queues one [`ZoneMapState`] history row per zone for persistence.
//!
//! The pass result (or error) is recorded in the service health monitor
//! every time. Errors never stop the loop.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use frontline_types::{
    CharacterId, FacilityId, FactionId, MapSnapshot, WorldId, ZoneId, ZoneMapState,
};
use frontline_world::{Drift, MapStore, WorldError, Zone};
use tracing::{error, info, warn};

use crate::alerts::{AlertManager, AlertTransition};
use crate::clock::Clock;
use crate::config::ReconciliationConfig;
use crate::error::SourceError;
use crate::health::{ServiceHealthMonitor, names};
use crate::persist::{PersistHandle, PersistRecord};
use crate::sessions::SessionTracker;
use crate::shutdown::ShutdownSignal;

/// Source of authoritative snapshots.
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current full state.
    fn fetch(&self) -> impl Future<Output = Result<MapSnapshot, SourceError>> + Send;
}

/// What one pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Facility owners corrected.
    pub corrected: usize,
    /// Facilities added to zones that did not know them.
    pub adopted: usize,
    /// Sessions opened from the online set.
    pub sessions_inferred: usize,
    /// Sessions closed after the grace period.
    pub sessions_timed_out: usize,
    /// Alerts opened by population updates.
    pub alerts_opened: usize,
    /// Zones rebuilt because their lock was poisoned.
    pub zones_rebuilt: usize,
    /// Map state history rows queued.
    pub map_states: usize,
}

impl ReconcileSummary {
    /// Total number of records touched.
    pub const fn affected(&self) -> usize {
        self.corrected
            .saturating_add(self.adopted)
            .saturating_add(self.sessions_inferred)
            .saturating_add(self.sessions_timed_out)
    }
}

/// The reconciliation poller.
pub struct ReconciliationPoller<S> {
    source: S,
    store: Arc<MapStore>,
    sessions: Arc<SessionTracker>,
    alerts: Arc<AlertManager>,
    health: Arc<ServiceHealthMonitor>,
    persist: PersistHandle,
    clock: Arc<dyn Clock>,
    config: ReconciliationConfig,
}

type ZoneOwners = BTreeMap<(WorldId, ZoneId), Vec<(FacilityId, FactionId)>>;

impl<S: SnapshotSource> ReconciliationPoller<S> {
    /// Create a poller.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        store: Arc<MapStore>,
        sessions: Arc<SessionTracker>,
        alerts: Arc<AlertManager>,
        health: Arc<ServiceHealthMonitor>,
        persist: PersistHandle,
        clock: Arc<dyn Clock>,
        config: ReconciliationConfig,
    ) -> Self {
        health.register(names::RECONCILIATION);
        Self {
            source,
            store,
            sessions,
            alerts,
            health,
            persist,
            clock,
            config,
        }
    }

    /// Apply corrections to one zone, rebuilding it first if its lock is
    /// poisoned. Returns the drifts and whether a rebuild happened.
    fn correct_zone(
        &self,
        world: WorldId,
        zone: ZoneId,
        owners: &[(FacilityId, FactionId)],
        now: DateTime<Utc>,
    ) -> Result<(Vec<Drift>, bool), WorldError> {
        let apply = |z: &mut Zone| {
            owners
                .iter()
                .filter_map(|(facility, faction)| z.correct(*facility, *faction, now))
                .collect::<Vec<_>>()
        };
        match self.store.with_zone_mut(world, zone, apply) {
            Ok(drifts) => Ok((drifts, false)),
            Err(WorldError::ZonePoisoned { .. }) => {
                error!(world = %world, zone = %zone, "zone poisoned; rebuilding before correction");
                self.store.rebuild_zone(world, zone)?;
                let drifts = self.store.with_zone_mut(world, zone, apply)?;
                Ok((drifts, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a snapshot taken at `now`.
    pub fn apply_snapshot(&self, snapshot: &MapSnapshot, now: DateTime<Utc>) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        let mut by_zone = ZoneOwners::new();
        for row in &snapshot.ownership {
            by_zone
                .entry((row.world_id, row.zone_id))
                .or_default()
                .push((row.facility_id, row.faction_id));
        }
        for ((world, zone), owners) in &by_zone {
            match self.correct_zone(*world, *zone, owners, now) {
                Ok((drifts, rebuilt)) => {
                    if rebuilt {
                        summary.zones_rebuilt = summary.zones_rebuilt.saturating_add(1);
                    }
                    for drift in drifts {
                        info!(
                            drift = true,
                            world = %world,
                            zone = %zone,
                            facility = %drift.facility_id,
                            previous = %drift.previous,
                            corrected = %drift.corrected,
                            adopted = drift.adopted,
                            "ownership corrected from snapshot"
                        );
                        if drift.adopted {
                            summary.adopted = summary.adopted.saturating_add(1);
                        } else {
                            summary.corrected = summary.corrected.saturating_add(1);
                        }
                    }
                }
                Err(e) => {
                    error!(world = %world, zone = %zone, error = %e, "zone correction failed");
                }
            }
        }

        let mut online: BTreeMap<WorldId, BTreeSet<CharacterId>> = BTreeMap::new();
        for row in &snapshot.online {
            online.entry(row.world_id).or_default().insert(row.character_id);
        }
        let mut worlds: BTreeSet<WorldId> = online.keys().copied().collect();
        worlds.extend(self.sessions.worlds());
        let empty = BTreeSet::new();
        for world in worlds {
            let result = self
                .sessions
                .reconcile(world, online.get(&world).unwrap_or(&empty), now);
            summary.sessions_inferred = summary.sessions_inferred.saturating_add(result.inferred);
            summary.sessions_timed_out = summary.sessions_timed_out.saturating_add(result.timed_out);
        }

        for row in &snapshot.population {
            if let AlertTransition::Opened(_) =
                self.alerts
                    .update_population(row.world_id, row.zone_id, row.players)
            {
                summary.alerts_opened = summary.alerts_opened.saturating_add(1);
            }
        }

        for state in map_states(by_zone, snapshot, now) {
            self.persist.send(PersistRecord::MapState(state));
            summary.map_states = summary.map_states.saturating_add(1);
        }

        summary
    }

    /// Fetch one snapshot and apply it.
    pub async fn pass(&self) -> Result<ReconcileSummary, SourceError> {
        let snapshot = self.source.fetch().await?;
        let now = self.clock.now();
        Ok(self.apply_snapshot(&snapshot, now))
    }

    /// Run one pass and record its outcome in the health monitor.
    pub async fn pass_and_record(&self) -> Result<ReconcileSummary, SourceError> {
        let started = Instant::now();
        let ran_at = self.clock.now();
        let result = self.pass().await;
        let message = match &result {
            Ok(s) => format!(
                "affected={} corrected={} adopted={} inferred={} timed_out={} saved={}",
                s.affected(),
                s.corrected,
                s.adopted,
                s.sessions_inferred,
                s.sessions_timed_out,
                s.map_states
            ),
            Err(e) => format!("error: {e}"),
        };
        self.health
            .record_run(names::RECONCILIATION, ran_at, started.elapsed(), message);
        result
    }

    /// Poll until `shutdown` fires. The first pass runs immediately.
    pub async fn run(self, shutdown: Arc<ShutdownSignal>) {
        info!(interval_secs = self.config.interval_secs, "reconciliation poller started");
        loop {
            if shutdown.is_triggered() {
                break;
            }

            let pause = if self.health.is_enabled(names::RECONCILIATION) {
                match self.pass_and_record().await {
                    Ok(summary) => info!(
                        affected = summary.affected(),
                        corrected = summary.corrected,
                        adopted = summary.adopted,
                        sessions_inferred = summary.sessions_inferred,
                        sessions_timed_out = summary.sessions_timed_out,
                        map_states = summary.map_states,
                        "reconciliation pass complete"
                    ),
                    Err(e) => warn!(error = %e, "reconciliation pass failed; retrying next cycle"),
                }
                self.config.interval()
            } else {
                self.config.disabled_retry()
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }
        info!("reconciliation poller stopped");
    }
}

/// One history row per zone named by the snapshot's ownership or
/// population sections.
fn map_states(
    mut owners: ZoneOwners,
    snapshot: &MapSnapshot,
    now: DateTime<Utc>,
) -> Vec<ZoneMapState> {
    let mut players: BTreeMap<(WorldId, ZoneId), u32> = BTreeMap::new();
    for row in &snapshot.population {
        players.insert((row.world_id, row.zone_id), row.players);
    }
    let mut zones: BTreeSet<(WorldId, ZoneId)> = owners.keys().copied().collect();
    zones.extend(players.keys().copied());
    zones
        .into_iter()
        .map(|key @ (world_id, zone_id)| ZoneMapState {
            world_id,
            zone_id,
            recorded_at: now,
            players: players.get(&key).copied(),
            owners: owners.remove(&key).unwrap_or_default(),
        })
        .collect()
}
