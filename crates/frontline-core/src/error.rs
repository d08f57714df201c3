//! Error types for the `frontline-core` crate.
//!
//! Data anomalies in the event stream are not errors; they are reported
//! through the per-event outcome enums in [`crate::tracker`] and
//! [`crate::sessions`]. The errors here cover collaborator failures and
//! broken invariants.

use chrono::{DateTime, Utc};
use frontline_world::WorldError;

/// Top-level error for the live state machines.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The ownership store failed.
    #[error("world state error: {source}")]
    World {
        /// The underlying store error.
        #[from]
        source: WorldError,
    },

    /// The snapshot source failed.
    #[error("snapshot source error: {source}")]
    Source {
        /// The underlying source error.
        #[from]
        source: SourceError,
    },

    /// The persistence sink failed.
    #[error("persistence error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: SinkError,
    },
}

/// Failures fetching an authoritative snapshot. Always transient from the
/// poller's point of view.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The upstream could not be reached or returned an error status.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered with something that could not be decoded.
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

/// Failures writing records to durable storage.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The storage backend rejected or failed the write.
    #[error("storage write failed: {0}")]
    Storage(String),
}

/// Failures reading or writing the reference cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache backend failed.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A cached value could not be encoded or decoded.
    #[error("cache codec error: {source}")]
    Codec {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// Precondition failures for alert queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlertQueryError {
    /// Participants are only available once the alert has ended.
    #[error("alert has not finished; it ends at {ends_at}")]
    NotFinished {
        /// When the alert ends.
        ends_at: DateTime<Utc>,
    },
}
