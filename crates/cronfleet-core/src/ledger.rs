//! Fleet status ledger: a bounded `{instance → last-known status}` map.
//!
//! Every instance writes its own entry on every protocol run. Entries that
//! have not been refreshed within the staleness window are pruned on every
//! write, whichever instance performs it, so the map cannot grow without
//! bound as instances come and go.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{LedgerEntry, Role};

/// Entries older than this are dropped.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(300);

fn default_staleness_secs() -> u64 {
    DEFAULT_STALENESS.as_secs()
}

/// The persisted ledger. Serializes as the entry map only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetLedger {
    entries: BTreeMap<String, LedgerEntry>,
    #[serde(skip, default = "default_staleness_secs")]
    staleness_secs: u64,
}

impl Default for FleetLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetLedger {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            staleness_secs: default_staleness_secs(),
        }
    }

    /// Override the staleness window (default 300s).
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness_secs = staleness.as_secs();
        self
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    /// Overwrite the writer's own entry, then prune relative to the
    /// entry's observation time.
    pub fn record(&mut self, entry: LedgerEntry) {
        let now = entry.observed_at;
        debug!(address = %entry.address, role = %entry.role, "ledger entry recorded");
        self.entries.insert(entry.address.clone(), entry);
        self.prune(now);
    }

    /// Remove every entry observed more than the staleness window before
    /// `now`. Returns the number of entries removed.
    pub fn prune(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        let window = self.staleness_secs;
        self.entries
            .retain(|_, e| now.saturating_sub(e.observed_at) <= window);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "stale ledger entries pruned");
        }
        removed
    }

    /// All entries, ordered by address.
    pub fn list(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn get(&self, address: &str) -> Option<&LedgerEntry> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instances whose latest entry reports `RUNNER`.
    pub fn runners(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| e.role == Role::Runner)
            .map(|e| e.address.as_str())
            .collect()
    }

    /// More than one instance currently reports `RUNNER`.
    pub fn has_simultaneous_runners(&self) -> bool {
        self.runners().len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: &str, role: Role, observed_at: u64) -> LedgerEntry {
        LedgerEntry {
            address: address.to_string(),
            role,
            schedule: vec![format!("# {role}")],
            observed_at,
        }
    }

    fn ledger_with(entries: &[(&str, u64)]) -> FleetLedger {
        let mut ledger = FleetLedger::new();
        for (addr, at) in entries {
            ledger
                .entries
                .insert(addr.to_string(), entry(addr, Role::Listener, *at));
        }
        ledger
    }

    #[test]
    fn record_overwrites_own_entry_only() {
        let mut ledger = FleetLedger::new();
        ledger.record(entry("10.0.0.1", Role::Listener, 1_000));
        ledger.record(entry("10.0.0.2", Role::Listener, 1_010));
        ledger.record(entry("10.0.0.1", Role::Runner, 1_020));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("10.0.0.1").unwrap().role, Role::Runner);
        assert_eq!(ledger.get("10.0.0.2").unwrap().observed_at, 1_010);
    }

    #[test]
    fn prune_removes_exactly_the_stale_entries() {
        let now = 10_000;
        // 3 fresh (≤300s), 2 stale (>300s).
        let mut ledger = ledger_with(&[
            ("a", now),
            ("b", now - 300),
            ("c", now - 120),
            ("d", now - 301),
            ("e", now - 9_000),
        ]);

        let removed = ledger.prune(now);
        assert_eq!(removed, 2);
        assert_eq!(ledger.len(), 3);
        assert!(ledger.get("d").is_none());
        assert!(ledger.get("e").is_none());

        // Idempotent.
        let snapshot = ledger.clone();
        assert_eq!(ledger.prune(now), 0);
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn record_prunes_other_instances() {
        let mut ledger = ledger_with(&[("gone", 1_000)]);
        ledger.record(entry("fresh", Role::Listener, 1_400));

        assert!(ledger.get("gone").is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn custom_staleness_window() {
        let mut ledger = ledger_with(&[("a", 1_000), ("b", 1_050)])
            .with_staleness(Duration::from_secs(60));
        assert_eq!(ledger.prune(1_100), 1);
        assert!(ledger.get("b").is_some());
    }

    #[test]
    fn detects_simultaneous_runners() {
        let mut ledger = FleetLedger::new();
        ledger.record(entry("a", Role::Runner, 1_000));
        assert!(!ledger.has_simultaneous_runners());

        ledger.record(entry("b", Role::Runner, 1_001));
        assert!(ledger.has_simultaneous_runners());
        assert_eq!(ledger.runners(), vec!["a", "b"]);

        ledger.record(entry("b", Role::Listener, 1_060));
        assert!(!ledger.has_simultaneous_runners());
    }

    #[test]
    fn serializes_entries_only() {
        let mut ledger = FleetLedger::new().with_staleness(Duration::from_secs(10));
        ledger.record(entry("a", Role::Deactivated, 5));

        let json = serde_json::to_string(&ledger).unwrap();
        assert!(!json.contains("staleness"));

        let back: FleetLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("a").unwrap().role, Role::Deactivated);
        assert_eq!(back.staleness(), DEFAULT_STALENESS);
    }
}
