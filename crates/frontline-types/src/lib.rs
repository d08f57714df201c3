//! Shared type definitions for the Frontline workspace.
//!
//! This crate is the single source of truth for the records that flow
//! between the live state machines, the persistence layer, and the read
//! API. Types are exported to `TypeScript` via `ts-rs` for dashboards.
//!
//! # Modules
//!
//! - [`ids`] -- Newtype wrappers for the upstream integer identifiers
//! - [`enums`] -- Ledger outcomes, alert reasons, session close reasons
//! - [`structs`] -- Ledger entries, alerts, sessions, map state history,
//!   health, reference data
//! - [`events`] -- Live event and snapshot wire shapes

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AlertReason, EventKind, LedgerOutcome, SessionCloseReason};
pub use events::{
    ControlEvent, FacilityOwnership, GameEvent, MapSnapshot, OnlineCharacter, PresenceEvent,
    ZonePopulation,
};
pub use ids::{AlertId, CharacterId, FacilityId, FactionId, WorldId, ZoneId};
pub use structs::{
    Alert, FacilityLink, FacilityMetadata, LedgerEntry, ServiceHealthEntry, Session, ZoneMapState,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::WorldId::export_all();
        let _ = crate::ids::ZoneId::export_all();
        let _ = crate::ids::FacilityId::export_all();
        let _ = crate::ids::FactionId::export_all();
        let _ = crate::ids::CharacterId::export_all();
        let _ = crate::ids::AlertId::export_all();

        // Enums
        let _ = crate::enums::LedgerOutcome::export_all();
        let _ = crate::enums::AlertReason::export_all();
        let _ = crate::enums::SessionCloseReason::export_all();
        let _ = crate::enums::EventKind::export_all();

        // Structs
        let _ = crate::structs::LedgerEntry::export_all();
        let _ = crate::structs::Alert::export_all();
        let _ = crate::structs::Session::export_all();
        let _ = crate::structs::ZoneMapState::export_all();
        let _ = crate::structs::ServiceHealthEntry::export_all();
        let _ = crate::structs::FacilityMetadata::export_all();
        let _ = crate::structs::FacilityLink::export_all();

        // Events
        let _ = crate::events::GameEvent::export_all();
        let _ = crate::events::MapSnapshot::export_all();
    }
}
