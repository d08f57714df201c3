//! Facility ownership tracker: applies live control events.
//!
//! For each event the tracker takes the zone's writer lock, classifies the
//! event (capture, defense, duplicate, stale, unknown facility), bumps the
//! zone's instability window, and releases the lock. Only then does it
//! notify the alert manager and queue the ledger entry, so no lock is held
//! while other subsystems run.

use std::sync::Arc;

use chrono::TimeDelta;
use frontline_types::{
    Alert, ControlEvent, FacilityId, FactionId, LedgerEntry, LedgerOutcome, WorldId, ZoneId,
};
use frontline_world::{ControlApplied, FacilityCatalog, MapStore, WorldError, Zone};
use tracing::{debug, warn};

use crate::alerts::{AlertManager, AlertTransition};
use crate::clock::Clock;
use crate::persist::{PersistHandle, PersistRecord};

/// Result of applying one control event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The event was applied and recorded in the ledger.
    Applied {
        /// The ledger entry produced.
        entry: LedgerEntry,
        /// Zone instability count after this event.
        instability: u32,
        /// An alert opened as a consequence of this event.
        alert: Option<Alert>,
    },
    /// The facility is not part of the zone.
    UnknownFacility,
    /// Redelivery of an already-applied event.
    Duplicate,
    /// Out-of-order event that would have overwritten a newer owner.
    Stale,
}

/// Whether `faction` owns any lattice neighbor of the event's facility.
/// Facilities without links are always considered adjacent.
fn has_adjacent_support(
    catalog: &FacilityCatalog,
    zone: &Zone,
    event: &ControlEvent,
    faction: FactionId,
) -> bool {
    let neighbors = catalog.neighbors(event.facility_id);
    neighbors.is_empty() || neighbors.iter().any(|n| zone.owner(*n) == Some(faction))
}

/// Applies control events to the ownership store.
pub struct FacilityTracker {
    store: Arc<MapStore>,
    alerts: Arc<AlertManager>,
    persist: PersistHandle,
    clock: Arc<dyn Clock>,
    window: TimeDelta,
}

impl std::fmt::Debug for FacilityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilityTracker")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl FacilityTracker {
    /// Create a tracker. `window` is the instability window length.
    pub fn new(
        store: Arc<MapStore>,
        alerts: Arc<AlertManager>,
        persist: PersistHandle,
        clock: Arc<dyn Clock>,
        window: TimeDelta,
    ) -> Self {
        Self {
            store,
            alerts,
            persist,
            clock,
            window,
        }
    }

    /// Apply one control event.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ZonePoisoned`] if the zone's lock is poisoned.
    /// The caller decides whether to rebuild the zone.
    pub fn apply(&self, event: &ControlEvent) -> Result<ControlOutcome, WorldError> {
        let now = self.clock.now();
        let catalog = self.store.catalog();
        let (applied, instability, adjacent) =
            self.store
                .with_zone_mut(event.world_id, event.zone_id, |zone| {
                    // Adjacency is judged against the lattice before the owner moves.
                    let adjacent = has_adjacent_support(catalog, zone, event, event.faction_id);
                    let applied = zone.apply_control(event);
                    let instability = if matches!(applied, ControlApplied::Applied(_)) {
                        zone.record_instability(now, self.window)
                    } else {
                        0
                    };
                    (applied, instability, adjacent)
                })?;

        let entry = match applied {
            ControlApplied::Applied(entry) => entry,
            ControlApplied::UnknownFacility => {
                warn!(
                    anomaly = "unknown_facility",
                    world = %event.world_id,
                    zone = %event.zone_id,
                    facility = %event.facility_id,
                    "control event for unknown facility ignored"
                );
                return Ok(ControlOutcome::UnknownFacility);
            }
            ControlApplied::Duplicate => {
                debug!(
                    world = %event.world_id,
                    facility = %event.facility_id,
                    "duplicate control event dropped"
                );
                return Ok(ControlOutcome::Duplicate);
            }
            ControlApplied::Stale { current } => {
                warn!(
                    anomaly = "stale_control",
                    world = %event.world_id,
                    zone = %event.zone_id,
                    facility = %event.facility_id,
                    faction = %event.faction_id,
                    current = %current,
                    "out-of-order control event dropped"
                );
                return Ok(ControlOutcome::Stale);
            }
        };

        if entry.outcome == LedgerOutcome::Captured && !adjacent {
            warn!(
                anomaly = "non_adjacent_capture",
                world = %entry.world_id,
                zone = %entry.zone_id,
                facility = %entry.facility_id,
                faction = %entry.faction_id,
                "capture by a faction holding no linked facility"
            );
        }

        debug!(
            world = %entry.world_id,
            zone = %entry.zone_id,
            facility = %entry.facility_id,
            outcome = entry.outcome.as_str(),
            faction = %entry.faction_id,
            instability,
            "control applied"
        );

        let alert = match self
            .alerts
            .on_instability(entry.world_id, entry.zone_id, instability)
        {
            AlertTransition::Opened(alert) => Some(alert),
            AlertTransition::Unchanged => None,
        };
        self.persist.send(PersistRecord::Ledger(entry.clone()));

        Ok(ControlOutcome::Applied {
            entry,
            instability,
            alert,
        })
    }

    /// Current owner of a facility.
    pub fn owner(
        &self,
        world: WorldId,
        zone: ZoneId,
        facility: FacilityId,
    ) -> Result<Option<FactionId>, WorldError> {
        self.store.owner(world, zone, facility)
    }
}
