//! Wire shapes consumed from the upstream provider: live events and
//! authoritative map snapshots.
//!
//! Events arrive at-least-once and in no guaranteed global order. Snapshots
//! are full state dumps fetched on demand by the reconciliation poller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EventKind;
use crate::ids::{CharacterId, FacilityId, FactionId, WorldId, ZoneId};

/// A facility changed hands or was held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ControlEvent {
    /// World the facility is on.
    pub world_id: WorldId,
    /// Zone the facility is in.
    pub zone_id: ZoneId,
    /// The facility.
    pub facility_id: FacilityId,
    /// Faction owning the facility after the event.
    pub faction_id: FactionId,
    /// Upstream event time.
    pub timestamp: DateTime<Utc>,
}

/// A character connected to or disconnected from a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PresenceEvent {
    /// The character.
    pub character_id: CharacterId,
    /// The world.
    pub world_id: WorldId,
    /// Upstream event time.
    pub timestamp: DateTime<Utc>,
}

/// One parsed event from the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum GameEvent {
    /// Facility capture or defense.
    Control(ControlEvent),
    /// Character login.
    Login(PresenceEvent),
    /// Character logout.
    Logout(PresenceEvent),
}

impl GameEvent {
    /// The world this event belongs to.
    pub const fn world_id(&self) -> WorldId {
        match self {
            Self::Control(e) => e.world_id,
            Self::Login(e) | Self::Logout(e) => e.world_id,
        }
    }

    /// Upstream timestamp of the event.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Control(e) => e.timestamp,
            Self::Login(e) | Self::Logout(e) => e.timestamp,
        }
    }

    /// Event discriminant.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Control(_) => EventKind::Control,
            Self::Login(_) => EventKind::Login,
            Self::Logout(_) => EventKind::Logout,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Authoritative owner of one facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FacilityOwnership {
    /// World.
    pub world_id: WorldId,
    /// Zone.
    pub zone_id: ZoneId,
    /// Facility.
    pub facility_id: FacilityId,
    /// Current owner.
    pub faction_id: FactionId,
}

/// One entry of the authoritative online set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OnlineCharacter {
    /// The character.
    pub character_id: CharacterId,
    /// The world it is online on.
    pub world_id: WorldId,
}

/// Concurrent player count in one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ZonePopulation {
    /// World.
    pub world_id: WorldId,
    /// Zone.
    pub zone_id: ZoneId,
    /// Players currently in the zone.
    pub players: u32,
}

/// Full authoritative state dump fetched by the reconciliation poller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MapSnapshot {
    /// Current owner of every facility.
    #[serde(default)]
    pub ownership: Vec<FacilityOwnership>,
    /// Every character currently online.
    #[serde(default)]
    pub online: Vec<OnlineCharacter>,
    /// Population per zone.
    #[serde(default)]
    pub population: Vec<ZonePopulation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_event_decodes_from_tagged_json() {
        let raw = r#"{
            "kind": "control",
            "world_id": 1,
            "zone_id": 2,
            "facility_id": 100,
            "faction_id": 3,
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;
        let event: Result<GameEvent, _> = serde_json::from_str(raw);
        assert!(matches!(
            event,
            Ok(GameEvent::Control(ControlEvent { facility_id: FacilityId(100), .. }))
        ));
    }

    #[test]
    fn presence_event_exposes_world() {
        let raw = r#"{"kind":"logout","character_id":9,"world_id":17,"timestamp":"2026-01-01T00:00:00Z"}"#;
        let event: Result<GameEvent, _> = serde_json::from_str(raw);
        assert_eq!(event.ok().map(|e| e.world_id()), Some(WorldId::new(17)));
    }

    #[test]
    fn snapshot_fields_default_when_missing() {
        let snap: Result<MapSnapshot, _> = serde_json::from_str("{}");
        assert_eq!(snap.ok(), Some(MapSnapshot::default()));
    }
}
