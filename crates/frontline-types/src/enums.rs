//! Enumeration types shared across the Frontline workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Classification of a single facility control event.
///
/// A control event is a capture iff the new owner differs from the owner
/// recorded immediately before it; otherwise it is a defense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LedgerOutcome {
    /// Ownership moved to a different faction.
    Captured,
    /// Ownership stayed with the same faction.
    Defended,
}

impl LedgerOutcome {
    /// Database/text form of the outcome.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Defended => "defended",
        }
    }

    /// Parse the database/text form of the outcome.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "captured" => Some(Self::Captured),
            "defended" => Some(Self::Defended),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Why an alert was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AlertReason {
    /// The zone's instability counter crossed the configured threshold while
    /// enough players were present.
    Instability {
        /// Control events counted inside the sliding window at trigger time.
        events: u32,
        /// Zone population at trigger time.
        population: u32,
    },
    /// An unfinished alert reloaded from durable storage at startup.
    Restored,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SessionCloseReason {
    /// A matching logout event arrived.
    Logout,
    /// A second login arrived without a logout in between.
    Relogin,
    /// The character was missing from the online snapshot for longer than
    /// the grace period.
    Timeout,
    /// The process is shutting down.
    Shutdown,
}

impl SessionCloseReason {
    /// Whether this close was forced rather than observed.
    pub const fn is_forced(self) -> bool {
        !matches!(self, Self::Logout)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Discriminant of a [`GameEvent`](crate::events::GameEvent), used for
/// logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A facility control (capture or defense) event.
    Control,
    /// A character logged in.
    Login,
    /// A character logged out.
    Logout,
}
