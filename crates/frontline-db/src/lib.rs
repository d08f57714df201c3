//! Data layer for Frontline (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` holds the durable history the live state machines emit:
//! the control ledger, alerts, closed sessions, and map state history,
//! plus the facility reference tables. `Dragonfly` caches reference data between restarts.
//!
//! ```text
//! Persistence drain
//!     |
//!     +-- LedgerStore   (facility_control, append-only)
//!     +-- AlertStore    (alert, insert on open, finalize on close)
//!     +-- SessionStore  (character_session, closed sessions)
//!     +-- MapStateStore (zone_map_state, one row per zone per pass)
//!
//! Startup populator
//!     +-- DragonflyCache (reference cache)
//!     +-- FacilityStore  (facility, facility_link)
//! ```
//!
//! # Modules
//!
//! - [`alert_store`] -- Alert insert, finalize, and lookup
//! - [`dragonfly`] -- `Dragonfly` reference cache
//! - [`error`] -- Shared error types
//! - [`facility_store`] -- Facility metadata and lattice links
//! - [`ledger_store`] -- Batch ledger insertion and querying
//! - [`map_state_store`] -- Map state history insertion and range queries
//! - [`postgres`] -- `PostgreSQL` connection pool and migrations
//! - [`session_store`] -- Batch session insertion and range queries

pub mod alert_store;
mod columns;
pub mod dragonfly;
pub mod error;
pub mod facility_store;
pub mod ledger_store;
pub mod map_state_store;
pub mod postgres;
pub mod session_store;

pub use alert_store::{AlertRow, AlertStore};
pub use dragonfly::DragonflyCache;
pub use error::DbError;
pub use facility_store::FacilityStore;
pub use ledger_store::{LedgerRow, LedgerStore};
pub use map_state_store::{MapStateRow, MapStateStore};
pub use postgres::{PostgresConfig, PostgresPool};
pub use session_store::{SessionRow, SessionStore};
