//! Embedded, file-backed [`LeaseStore`].
//!
//! Lets processes on one host coordinate through a shared redb file
//! (development machines, a single `watch` process). redb holds an
//! exclusive lock on the file while it is open, so two processes opening
//! it at the same instant see the second open fail; that surfaces as an
//! unavailable store for that tick.
//!
//! redb has no native expiry, so every value is stored with its deadline
//! and expired values read as absent. Expired rows are purged on write.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cronfleet_core::Clock;

use crate::error::{StoreError, StoreResult};
use crate::store::LeaseStore;
use crate::tables::ENTRIES;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    value: Vec<u8>,
    expires_at_ms: u64,
}

/// Thread-safe TTL store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open (or create) a store file at the given path.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Backend))?;
        let store = Self {
            db: Arc::new(db),
            clock,
        };
        store.ensure_tables()?;
        debug!(?path, "lease store file opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory database (for testing).
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Backend))?;
        let store = Self {
            db: Arc::new(db),
            clock,
        };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    /// Remove every expired row. Returns the number removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now_millis();
        let expired: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Backend))?;
            let table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
            table
                .iter()
                .map_err(map_err!(Backend))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let stored: StoredValue = serde_json::from_slice(value.value()).ok()?;
                    (stored.expires_at_ms <= now).then(|| key.value().to_string())
                })
                .collect()
        };
        if expired.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Backend))?;
            }
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(removed = expired.len(), "expired lease store rows purged");
        Ok(expired.len())
    }

    fn read(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
        match table.get(key).map_err(map_err!(Backend))? {
            Some(guard) => {
                let stored: StoredValue =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }
}

impl LeaseStore for RedbStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now_millis();
        Ok(self
            .read(key)?
            .filter(|stored| stored.expires_at_ms > now)
            .map(|stored| stored.value))
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let stored = StoredValue {
            value: value.to_vec(),
            expires_at_ms: self.clock.now_millis() + ttl.as_millis() as u64,
        };
        let bytes = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        // The write has landed; a failed purge must not report otherwise.
        if let Err(e) = self.purge_expired() {
            warn!(error = %e, "expired row purge failed");
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        let removed;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
            removed = match table.remove(key).map_err(map_err!(Backend))? {
                Some(guard) => serde_json::from_slice::<StoredValue>(guard.value())
                    .map(|stored| stored.expires_at_ms > now)
                    .unwrap_or(false),
                None => false,
            };
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "redb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronfleet_core::ManualClock;

    fn store() -> (RedbStore, ManualClock) {
        let clock = ManualClock::at_secs(1_000);
        let store = RedbStore::open_in_memory(Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    #[test]
    fn set_get_and_expire() {
        let (store, clock) = store();
        store
            .set_with_ttl("lease-holder", b"a", Duration::from_secs(90))
            .unwrap();
        assert_eq!(store.get("lease-holder").unwrap(), Some(b"a".to_vec()));

        clock.advance(Duration::from_secs(90));
        assert!(store.get("lease-holder").unwrap().is_none());
    }

    #[test]
    fn delete_live_and_expired() {
        let (store, clock) = store();
        store.set_with_ttl("a", b"1", Duration::from_secs(10)).unwrap();
        store.set_with_ttl("b", b"2", Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("b").unwrap());
        assert!(!store.delete("missing").unwrap());
    }

    #[test]
    fn writes_purge_expired_rows() {
        let (store, clock) = store();
        store.set_with_ttl("old", b"x", Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(5));
        store.set_with_ttl("new", b"y", Duration::from_secs(60)).unwrap();

        assert!(store.read("old").unwrap().is_none());
        assert!(store.read("new").unwrap().is_some());
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[test]
    fn unreadable_rows_do_not_fail_writes() {
        let (store, clock) = store();
        {
            let txn = store.db.begin_write().unwrap();
            {
                let mut table = txn.open_table(ENTRIES).unwrap();
                table.insert("garbage", b"not json".as_slice()).unwrap();
            }
            txn.commit().unwrap();
        }
        store.set_with_ttl("old", b"x", Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(5));

        store
            .set_with_ttl("lease-holder", b"10.0.0.1", Duration::from_secs(90))
            .unwrap();
        assert_eq!(
            store.get("lease-holder").unwrap(),
            Some(b"10.0.0.1".to_vec())
        );
        assert!(store.read("old").unwrap().is_none());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lease.redb");
        let clock = ManualClock::at_secs(1_000);

        {
            let store = RedbStore::open(&path, Arc::new(clock.clone())).unwrap();
            store
                .set_with_ttl("lease-holder", b"10.0.0.1", Duration::from_secs(90))
                .unwrap();
        }

        let store = RedbStore::open(&path, Arc::new(clock.clone())).unwrap();
        assert_eq!(
            store.get("lease-holder").unwrap(),
            Some(b"10.0.0.1".to_vec())
        );
    }
}
