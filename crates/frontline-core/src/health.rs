//! Service health registry for background loops.
//!
//! Every long-lived loop owns one named [`ServiceHealthEntry`]. Once per
//! cycle the loop reads its entry: a disabled entry means "sleep and check
//! again later" instead of running the body. After each run the loop writes
//! back when it ran, how long it took, and a short message. Operators flip
//! `enabled` through the read API as a kill-switch.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use frontline_types::ServiceHealthEntry;

/// Well-known loop names.
pub mod names {
    /// Reconciliation poller.
    pub const RECONCILIATION: &str = "reconciliation";
    /// Alert sweep loop.
    pub const ALERT_SWEEP: &str = "alert_sweep";
    /// Persistence drain.
    pub const PERSISTENCE: &str = "persistence";
    /// Live event ingestion.
    pub const INGEST: &str = "ingest";
}

/// Process-wide name → health entry map.
#[derive(Debug, Default)]
pub struct ServiceHealthMonitor {
    entries: RwLock<BTreeMap<String, ServiceHealthEntry>>,
}

impl ServiceHealthMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as enabled if it is not already known.
    pub fn register(&self, name: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .entry(name.to_owned())
            .or_insert_with(|| ServiceHealthEntry::new(name));
    }

    /// Copy of the entry for `name`.
    pub fn get(&self, name: &str) -> Option<ServiceHealthEntry> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.get(name).cloned()
    }

    /// Replace the entry for `name`.
    pub fn set(&self, name: &str, entry: ServiceHealthEntry) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(name.to_owned(), entry);
    }

    /// Whether the loop `name` should run. Unknown loops are enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_none_or(|e| e.enabled)
    }

    /// Flip the kill-switch. Returns the updated entry, or `None` if `name`
    /// was never registered.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Option<ServiceHealthEntry> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries.get_mut(name)?;
        entry.enabled = enabled;
        Some(entry.clone())
    }

    /// Record a completed run, keeping the current `enabled` flag.
    pub fn record_run(&self, name: &str, ran_at: DateTime<Utc>, took: Duration, message: String) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries
            .entry(name.to_owned())
            .or_insert_with(|| ServiceHealthEntry::new(name));
        entry.last_ran = Some(ran_at);
        entry.run_duration_ms = u64::try_from(took.as_millis()).unwrap_or(u64::MAX);
        entry.message = message;
    }

    /// All entries, ordered by name.
    pub fn all(&self) -> Vec<ServiceHealthEntry> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.values().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_loops_default_to_enabled() {
        let monitor = ServiceHealthMonitor::new();
        assert!(monitor.is_enabled("nope"));
        assert!(monitor.get("nope").is_none());
        assert!(monitor.set_enabled("nope", false).is_none());
    }

    #[test]
    fn kill_switch_survives_run_records() {
        let monitor = ServiceHealthMonitor::new();
        monitor.register(names::RECONCILIATION);
        monitor.set_enabled(names::RECONCILIATION, false).unwrap();

        monitor.record_run(
            names::RECONCILIATION,
            Utc::now(),
            Duration::from_millis(42),
            String::from("ok"),
        );

        let entry = monitor.get(names::RECONCILIATION).unwrap();
        assert!(!entry.enabled);
        assert_eq!(entry.run_duration_ms, 42);
        assert_eq!(entry.message, "ok");
        assert!(entry.last_ran.is_some());
    }

    #[test]
    fn set_replaces_and_all_is_sorted() {
        let monitor = ServiceHealthMonitor::new();
        monitor.register("b");
        monitor.register("a");
        let mut entry = ServiceHealthEntry::new("b");
        entry.message = String::from("replaced");
        monitor.set("b", entry);

        let all = monitor.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all.first().map(|e| e.name.as_str()), Some("a"));
        assert_eq!(monitor.get("b").unwrap().message, "replaced");
    }
}
