//! Live territory, alert, and session state machines for Frontline.
//!
//! This crate owns the three cooperating state machines (facility
//! ownership, alert lifecycle, sessions), the loops that keep them honest
//! (reconciliation, alert sweep), and the asynchronous persistence drain.
//! Transport, storage, and HTTP live in other crates and plug in through
//! the [`SnapshotSource`], [`RecordSink`], and [`ReferenceCache`] traits.
//!
//! # Modules
//!
//! - [`alerts`] -- Per-zone Idle/Active alert state machine and sweep loop.
//! - [`cache`] -- [`ReferenceCache`] capability and in-memory backend.
//! - [`clock`] -- [`Clock`] trait with system and manual clocks.
//! - [`config`] -- Configuration loading from `frontline-config.yaml`.
//! - [`error`] -- Error types.
//! - [`health`] -- Per-loop health entries and kill-switches.
//! - [`ingest`] -- World-sharded event routing.
//! - [`persist`] -- Batched, retrying persistence drain.
//! - [`reconcile`] -- Periodic snapshot reconciliation.
//! - [`runtime`] -- Component wiring and ordered shutdown.
//! - [`sessions`] -- Session tracker.
//! - [`shutdown`] -- Cooperative shutdown signal.
//! - [`tracker`] -- Control event application.
//!
//! [`SnapshotSource`]: reconcile::SnapshotSource
//! [`RecordSink`]: persist::RecordSink
//! [`ReferenceCache`]: cache::ReferenceCache
//! [`Clock`]: clock::Clock

pub mod alerts;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod ingest;
pub mod persist;
pub mod reconcile;
pub mod runtime;
pub mod sessions;
pub mod shutdown;
pub mod tracker;

pub use alerts::{AlertManager, AlertTransition};
pub use cache::{MemoryCache, ReferenceCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FrontlineConfig};
pub use error::{AlertQueryError, CacheError, CoreError, SinkError, SourceError};
pub use health::ServiceHealthMonitor;
pub use ingest::{EventOutcome, EventProcessor, IngestRouter};
pub use persist::{PersistHandle, PersistRecord, PersistenceSync, RecordSink};
pub use reconcile::{ReconcileSummary, ReconciliationPoller, SnapshotSource};
pub use runtime::{FrontlineCore, PersistQueue, Runtime};
pub use sessions::{LoginOutcome, LogoutOutcome, SessionTracker};
pub use shutdown::ShutdownSignal;
pub use tracker::{ControlOutcome, FacilityTracker};
