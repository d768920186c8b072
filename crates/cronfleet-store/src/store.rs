//! The capability interface every store backend implements.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreResult;

/// Get / set-with-TTL / delete against a shared key-value store.
///
/// Implementations must bound every call; a slow store surfaces as
/// [`StoreError::Timeout`](crate::StoreError::Timeout) rather than a
/// stalled tick.
pub trait LeaseStore: Send + Sync {
    /// Read a value. Expired keys read as `None`.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a value that disappears after `ttl`.
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Remove a key. Returns true if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Backend name for logs and status output.
    fn backend_name(&self) -> &'static str;
}

impl<S: LeaseStore + ?Sized> LeaseStore for Arc<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        (**self).set_with_ttl(key, value, ttl)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

impl<S: LeaseStore + ?Sized> LeaseStore for Box<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        (**self).set_with_ttl(key, value, ttl)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
