//! Error types for the `frontline-world` crate.
//!
//! Data anomalies (unknown facilities, stale events) are not errors here;
//! they are reported through outcome values. [`WorldError`] is reserved for
//! broken internal invariants.

use frontline_types::{WorldId, ZoneId};

/// Errors that can occur during ownership-table operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A writer panicked while holding a zone lock, leaving the zone in an
    /// unknown state. The zone must be rebuilt before it can be used again.
    #[error("zone {zone} on world {world} is poisoned")]
    ZonePoisoned {
        /// The world.
        world: WorldId,
        /// The zone.
        zone: ZoneId,
    },

    /// The world or zone index itself is poisoned.
    #[error("world index poisoned: {0}")]
    IndexPoisoned(String),

    /// A facility link references a facility missing from the catalog.
    #[error("link references unknown facility {0}")]
    DanglingLink(frontline_types::FacilityId),
}
