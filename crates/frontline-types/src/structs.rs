//! Core record structs: ledger entries, alerts, sessions, service health,
//! and static facility reference data.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AlertReason, LedgerOutcome};
use crate::ids::{AlertId, CharacterId, FacilityId, FactionId, WorldId, ZoneId};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Immutable record of one applied facility control event.
///
/// Produced by the ownership tracker and drained to durable storage. Never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LedgerEntry {
    /// The facility the event was about.
    pub facility_id: FacilityId,
    /// Zone containing the facility.
    pub zone_id: ZoneId,
    /// World the zone belongs to.
    pub world_id: WorldId,
    /// Capture or defense.
    pub outcome: LedgerOutcome,
    /// Faction that owns the facility after the event.
    pub faction_id: FactionId,
    /// Faction that owned the facility before the event.
    pub previous_faction_id: FactionId,
    /// Upstream timestamp of the event.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// A timed period of heightened zone-wide contest.
///
/// Open alerts are owned by the alert lifecycle manager; once the alert's
/// duration has elapsed it is finalized and never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Alert {
    /// Durable ID, `None` until the alert has been inserted into storage.
    pub id: Option<AlertId>,
    /// World the alert is running on.
    pub world_id: WorldId,
    /// Zone the alert is running on.
    pub zone_id: ZoneId,
    /// When the alert started.
    pub started_at: DateTime<Utc>,
    /// Length of the alert in seconds.
    pub duration_secs: u32,
    /// What opened the alert.
    pub reason: AlertReason,
}

impl Alert {
    /// The instant at which the alert ends.
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at
            .checked_add_signed(TimeDelta::seconds(i64::from(self.duration_secs)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the alert has finished at `now`, i.e. `now >= start + duration`.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at()
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A character's continuous connected period in a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Session {
    /// The character.
    pub character_id: CharacterId,
    /// The world the character is connected to.
    pub world_id: WorldId,
    /// Login time.
    pub start: DateTime<Utc>,
    /// Logout time, `None` while the session is open.
    pub end: Option<DateTime<Utc>>,
    /// The login was never observed; the session was opened from a
    /// reconciliation snapshot at poll time.
    #[serde(default)]
    pub start_inferred: bool,
}

impl Session {
    /// Open a new session starting at `start`.
    pub const fn open(character_id: CharacterId, world_id: WorldId, start: DateTime<Utc>) -> Self {
        Self {
            character_id,
            world_id,
            start,
            end: None,
            start_inferred: false,
        }
    }

    /// Whether the session has no end yet.
    pub const fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Whether the session overlaps the half-open window `[from, to)`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end.is_none_or(|end| end > from)
    }
}

// ---------------------------------------------------------------------------
// Map state history
// ---------------------------------------------------------------------------

/// Ownership and population of one zone as seen by one reconciliation pass.
///
/// Written once per zone per pass; the rows form the map state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ZoneMapState {
    /// World.
    pub world_id: WorldId,
    /// Zone.
    pub zone_id: ZoneId,
    /// When the snapshot was applied.
    pub recorded_at: DateTime<Utc>,
    /// Players in the zone, `None` when the snapshot carried no count.
    pub players: Option<u32>,
    /// Authoritative owner of every facility listed for the zone.
    pub owners: Vec<(FacilityId, FactionId)>,
}

// ---------------------------------------------------------------------------
// Service health
// ---------------------------------------------------------------------------

/// Liveness record for one background loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ServiceHealthEntry {
    /// Loop name, unique process-wide.
    pub name: String,
    /// Operational kill-switch. A disabled loop sleeps instead of running.
    pub enabled: bool,
    /// When the loop body last completed.
    pub last_ran: Option<DateTime<Utc>>,
    /// How long the last run took, in milliseconds.
    pub run_duration_ms: u64,
    /// Free-form summary of the last run.
    pub message: String,
}

impl ServiceHealthEntry {
    /// A fresh, enabled entry that has never run.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            enabled: true,
            last_ran: None,
            run_duration_ms: 0,
            message: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Static reference data
// ---------------------------------------------------------------------------

/// Static metadata about a facility, supplied by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FacilityMetadata {
    /// Facility ID.
    pub facility_id: FacilityId,
    /// Zone the facility sits in.
    pub zone_id: ZoneId,
    /// Display name.
    pub name: String,
    /// Upstream facility type ID.
    pub type_id: u32,
    /// Upstream facility type name.
    pub type_name: String,
}

/// Static lattice edge between two facilities in the same zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FacilityLink {
    /// Zone both facilities belong to.
    pub zone_id: ZoneId,
    /// One end of the link.
    pub facility_a: FacilityId,
    /// The other end of the link.
    pub facility_b: FacilityId,
}

impl FacilityLink {
    /// The facility on the other end of this link from `facility`, if the
    /// link touches it.
    pub fn other(&self, facility: FacilityId) -> Option<FacilityId> {
        if self.facility_a == facility {
            Some(self.facility_b)
        } else if self.facility_b == facility {
            Some(self.facility_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000_i64.saturating_add(secs), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn alert(duration_secs: u32) -> Alert {
        Alert {
            id: None,
            world_id: WorldId::new(1),
            zone_id: ZoneId::new(2),
            started_at: at(0),
            duration_secs,
            reason: AlertReason::Restored,
        }
    }

    #[test]
    fn alert_finishes_exactly_at_end() {
        let a = alert(900);
        assert!(!a.is_finished(at(0)));
        assert!(!a.is_finished(at(899)));
        assert!(a.is_finished(at(900)));
        assert!(a.is_finished(at(901)));
    }

    #[test]
    fn session_overlap_is_half_open() {
        let mut s = Session::open(CharacterId::new(1), WorldId::new(1), at(100));
        assert!(s.overlaps(at(0), at(101)));
        assert!(!s.overlaps(at(0), at(100)));
        s.end = Some(at(200));
        assert!(s.overlaps(at(199), at(300)));
        assert!(!s.overlaps(at(200), at(300)));
    }

    #[test]
    fn link_other_end() {
        let link = FacilityLink {
            zone_id: ZoneId::new(2),
            facility_a: FacilityId::new(10),
            facility_b: FacilityId::new(11),
        };
        assert_eq!(link.other(FacilityId::new(10)), Some(FacilityId::new(11)));
        assert_eq!(link.other(FacilityId::new(11)), Some(FacilityId::new(10)));
        assert_eq!(link.other(FacilityId::new(12)), None);
    }
}
