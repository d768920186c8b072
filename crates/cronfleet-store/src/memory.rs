//! In-process store with clock-driven expiry.
//!
//! Shared between simulated instances in tests (wrap it in an `Arc`) and
//! used by the `memory` backend for single-process runs. The
//! [`set_unavailable`](MemoryStore::set_unavailable) switch makes every
//! operation fail, standing in for a store outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cronfleet_core::Clock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::LeaseStore;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at_ms: u64,
}

/// Thread-safe in-memory [`LeaseStore`].
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys.
    pub fn live_keys(&self) -> usize {
        let now = self.clock.now_millis();
        self.lock()
            .map(|entries| entries.values().filter(|s| s.expires_at_ms > now).count())
            .unwrap_or(0)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, Slot>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl LeaseStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(slot) if slot.expires_at_ms > now => Ok(Some(slot.value.clone())),
            Some(_) => {
                entries.remove(key);
                debug!(%key, "expired key evicted");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.check_available()?;
        let expires_at_ms = self.clock.now_millis() + ttl.as_millis() as u64;
        self.lock()?.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let removed = self.lock()?.remove(key);
        Ok(removed.is_some_and(|slot| slot.expires_at_ms > now))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
