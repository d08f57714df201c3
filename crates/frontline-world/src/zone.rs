//! Per-zone ownership state.
//!
//! A [`Zone`] owns the facility → faction table for one (world, zone) pair
//! plus the rolling instability window that feeds the alert manager. All
//! mutation goes through [`Zone::apply_control`] (live events) or
//! [`Zone::correct`] (reconciliation), and the caller holds the zone's
//! writer lock for the duration of either call.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use frontline_types::{
    ControlEvent, FacilityId, FactionId, LedgerEntry, LedgerOutcome, WorldId, ZoneId,
};
use serde::Serialize;

/// Runtime state of one facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FacilityState {
    /// Current owner. [`FactionId::NEUTRAL`] until the first event.
    pub owner: FactionId,
    /// Timestamp of the last live event applied to this facility.
    pub last_applied: Option<DateTime<Utc>>,
}

impl FacilityState {
    /// A neutral facility that has never seen an event.
    pub const fn neutral() -> Self {
        Self {
            owner: FactionId::NEUTRAL,
            last_applied: None,
        }
    }
}

/// Result of applying one control event to a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlApplied {
    /// The facility is not part of this zone.
    UnknownFacility,
    /// Redelivery of an event already applied (same owner, not newer).
    Duplicate,
    /// An out-of-order event older than the last applied one that would
    /// change the owner. Left for reconciliation.
    Stale {
        /// Owner kept in the table.
        current: FactionId,
    },
    /// The event was applied.
    Applied(LedgerEntry),
}

/// A reconciliation correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Drift {
    /// Corrected facility.
    pub facility_id: FacilityId,
    /// Owner held in memory before the correction.
    pub previous: FactionId,
    /// Authoritative owner now in the table.
    pub corrected: FactionId,
    /// The facility was not known to the zone and has been added.
    pub adopted: bool,
}

/// Ownership table and instability window for one zone.
#[derive(Debug, Clone)]
pub struct Zone {
    world_id: WorldId,
    zone_id: ZoneId,
    facilities: BTreeMap<FacilityId, FacilityState>,
    /// Timestamps of recent applied control events, oldest first.
    instability: VecDeque<DateTime<Utc>>,
}

impl Zone {
    /// Create a zone with every listed facility neutral.
    pub fn new(world_id: WorldId, zone_id: ZoneId, facilities: &[FacilityId]) -> Self {
        Self {
            world_id,
            zone_id,
            facilities: facilities
                .iter()
                .map(|id| (*id, FacilityState::neutral()))
                .collect(),
            instability: VecDeque::new(),
        }
    }

    /// World this zone belongs to.
    pub const fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// Zone ID.
    pub const fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    /// Current owner of `facility`, `None` if the zone does not know it.
    pub fn owner(&self, facility: FacilityId) -> Option<FactionId> {
        self.facilities.get(&facility).map(|s| s.owner)
    }

    /// Full runtime state of `facility`.
    pub fn facility(&self, facility: FacilityId) -> Option<FacilityState> {
        self.facilities.get(&facility).copied()
    }

    /// Point-in-time copy of the ownership table.
    pub fn snapshot(&self) -> BTreeMap<FacilityId, FactionId> {
        self.facilities.iter().map(|(id, s)| (*id, s.owner)).collect()
    }

    /// Number of facilities in the zone.
    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    /// Whether the zone has no facilities.
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Apply a live control event.
    ///
    /// An event older than the facility's last applied event is dropped:
    /// as a duplicate when it names the current owner, as stale otherwise.
    /// An event with the same timestamp and owner is a redelivery.
    pub fn apply_control(&mut self, event: &ControlEvent) -> ControlApplied {
        let Some(state) = self.facilities.get_mut(&event.facility_id) else {
            return ControlApplied::UnknownFacility;
        };

        if let Some(last) = state.last_applied {
            let same_owner = state.owner == event.faction_id;
            if event.timestamp < last || (event.timestamp == last && same_owner) {
                return if same_owner {
                    ControlApplied::Duplicate
                } else {
                    ControlApplied::Stale {
                        current: state.owner,
                    }
                };
            }
        }

        let previous = state.owner;
        let outcome = if previous == event.faction_id {
            LedgerOutcome::Defended
        } else {
            LedgerOutcome::Captured
        };
        state.owner = event.faction_id;
        state.last_applied = Some(event.timestamp);

        ControlApplied::Applied(LedgerEntry {
            facility_id: event.facility_id,
            zone_id: self.zone_id,
            world_id: self.world_id,
            outcome,
            faction_id: event.faction_id,
            previous_faction_id: previous,
            timestamp: event.timestamp,
        })
    }

    /// Overwrite a facility's owner with an authoritative value observed
    /// at `as_of`.
    ///
    /// Returns `None` when the table already agrees. Unknown facilities are
    /// adopted. The last-applied timestamp is raised to `as_of`, so a live
    /// event dated before the snapshot can no longer override it.
    pub fn correct(
        &mut self,
        facility: FacilityId,
        owner: FactionId,
        as_of: DateTime<Utc>,
    ) -> Option<Drift> {
        match self.facilities.get_mut(&facility) {
            Some(state) => {
                state.last_applied = Some(state.last_applied.map_or(as_of, |t| t.max(as_of)));
                if state.owner == owner {
                    return None;
                }
                let previous = state.owner;
                state.owner = owner;
                Some(Drift {
                    facility_id: facility,
                    previous,
                    corrected: owner,
                    adopted: false,
                })
            }
            None => {
                self.facilities.insert(
                    facility,
                    FacilityState {
                        owner,
                        last_applied: Some(as_of),
                    },
                );
                Some(Drift {
                    facility_id: facility,
                    previous: FactionId::NEUTRAL,
                    corrected: owner,
                    adopted: true,
                })
            }
        }
    }

    // -------------------------------------------------------------------
    // Instability window
    // -------------------------------------------------------------------

    /// Record one applied control event at `at` and return the number of
    /// events inside the window ending at `at`.
    pub fn record_instability(&mut self, at: DateTime<Utc>, window: TimeDelta) -> u32 {
        self.instability.push_back(at);
        self.instability_count(at, window)
    }

    /// Drop events older than `now - window` and return how many remain.
    pub fn instability_count(&mut self, now: DateTime<Utc>, window: TimeDelta) -> u32 {
        let cutoff = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        while self.instability.front().is_some_and(|t| *t <= cutoff) {
            self.instability.pop_front();
        }
        u32::try_from(self.instability.len()).unwrap_or(u32::MAX)
    }

    /// Clear the instability window.
    pub fn reset_instability(&mut self) {
        self.instability.clear();
    }
}
