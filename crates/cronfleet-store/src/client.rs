//! Typed access to the keys the fleet coordinates through.
//!
//! | key            | value                          |
//! |----------------|--------------------------------|
//! | `lease-holder` | [`LeaseRecord`] (JSON)         |
//! | `init-marker`  | claimant address (presence)    |
//! | `last-active`  | address of the latest claimant |
//! | `fleet-status` | [`FleetLedger`] (JSON)         |
//!
//! With a key prefix configured every key becomes `{prefix}:{key}`.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use cronfleet_core::{FleetLedger, LeaseRecord};

use crate::error::{StoreError, StoreResult};
use crate::store::LeaseStore;

/// Resolved store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    pub lease_holder: String,
    pub init_marker: String,
    pub last_active: String,
    pub fleet_status: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::with_prefix(None)
    }
}

impl KeySpace {
    pub fn with_prefix(prefix: Option<&str>) -> Self {
        let key = |name: &str| match prefix {
            Some(p) if !p.is_empty() => format!("{p}:{name}"),
            _ => name.to_string(),
        };
        Self {
            lease_holder: key("lease-holder"),
            init_marker: key("init-marker"),
            last_active: key("last-active"),
            fleet_status: key("fleet-status"),
        }
    }
}

/// Lease store handle with typed operations.
pub struct LeaseStoreClient<S> {
    store: S,
    keys: KeySpace,
}

impl<S: LeaseStore> LeaseStoreClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            keys: KeySpace::default(),
        }
    }

    pub fn with_keys(mut self, keys: KeySpace) -> Self {
        self.keys = keys;
        self
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Lease ──────────────────────────────────────────────────────

    pub fn read_lease(&self) -> StoreResult<Option<LeaseRecord>> {
        self.get_json(&self.keys.lease_holder)
    }

    pub fn write_lease(&self, lease: &LeaseRecord, ttl: Duration) -> StoreResult<()> {
        self.set_json(&self.keys.lease_holder, lease, ttl)?;
        debug!(holder = %lease.holder, ttl_secs = ttl.as_secs(), "lease written");
        Ok(())
    }

    // ── Initialization marker ──────────────────────────────────────

    pub fn marker_present(&self) -> StoreResult<bool> {
        Ok(self.store.get(&self.keys.init_marker)?.is_some())
    }

    pub fn set_marker(&self, claimant: &str, ttl: Duration) -> StoreResult<()> {
        self.store
            .set_with_ttl(&self.keys.init_marker, claimant.as_bytes(), ttl)
    }

    pub fn clear_marker(&self) -> StoreResult<bool> {
        self.store.delete(&self.keys.init_marker)
    }

    // ── Last known active address ──────────────────────────────────

    pub fn read_last_active(&self) -> StoreResult<Option<String>> {
        match self.store.get(&self.keys.last_active)? {
            Some(raw) => String::from_utf8(raw)
                .map(Some)
                .map_err(|e| StoreError::Deserialize(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn write_last_active(&self, address: &str, ttl: Duration) -> StoreResult<()> {
        self.store
            .set_with_ttl(&self.keys.last_active, address.as_bytes(), ttl)
    }

    // ── Fleet status ledger ────────────────────────────────────────

    /// Load the ledger; a missing key reads as an empty ledger.
    pub fn load_ledger(&self) -> StoreResult<FleetLedger> {
        Ok(self
            .get_json::<FleetLedger>(&self.keys.fleet_status)?
            .unwrap_or_default())
    }

    pub fn save_ledger(&self, ledger: &FleetLedger, ttl: Duration) -> StoreResult<()> {
        self.set_json(&self.keys.fleet_status, ledger, ttl)
    }

    // ── JSON helpers ───────────────────────────────────────────────

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(key)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StoreError::Deserialize(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> StoreResult<()> {
        let raw = serde_json::to_vec(value)
            .map_err(|e| StoreError::Serialize(format!("{key}: {e}")))?;
        self.store.set_with_ttl(key, &raw, ttl)
    }
}
