//! Facility ownership state for the Frontline live world.
//!
//! This crate holds the in-memory ownership table: which faction owns each
//! facility in each zone of each world, and the static lattice describing
//! how facilities connect.
//!
//! # Modules
//!
//! - [`catalog`] -- Static facility metadata and lattice adjacency.
//! - [`error`] -- Error types for ownership-table operations.
//! - [`zone`] -- [`Zone`]: per-zone ownership table, event classification,
//!   drift correction, and the rolling instability window.
//! - [`world_map`] -- [`MapStore`]: lazily created worlds and zones, each
//!   zone behind its own writer lock.

pub mod catalog;
pub mod error;
pub mod world_map;
pub mod zone;

// Re-export primary types at crate root.
pub use catalog::FacilityCatalog;
pub use error::WorldError;
pub use world_map::{MapStore, WorldMap};
pub use zone::{ControlApplied, Drift, FacilityState, Zone};
