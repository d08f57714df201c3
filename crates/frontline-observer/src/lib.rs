//! Read API for Frontline live state.
//!
//! A thin Axum layer over the exposed accessors of the live state
//! machines: zone ownership, facility owners, running alerts, open
//! sessions, alert participation, and the loop health kill-switches.
//!
//! Live reads never touch storage. Alert history and participation are
//! served from an [`AlertArchive`], `PostgreSQL` in production.
//!
//! [`AlertArchive`]: state::AlertArchive

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::{AlertArchive, AppState};
