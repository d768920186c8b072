//! The shared key-value store the fleet coordinates
//! through.
//!
//! # Architecture
//!
//! ```text
//! LeaseStoreClient (typed: lease, init marker, last-active, ledger)
//!   └── dyn LeaseStore (get / set_with_ttl / delete)
//!         ├── RedisStore   RESP2 over TCP, bounded timeouts
//!         ├── RedbStore    embedded file, expiry stored with the value
//!         └── MemoryStore  in-process, Clock-driven TTL, fault switch
//! ```
//!
//! The store offers no transactions and no compare-and-swap. Every value
//! is JSON-serialized and every write carries a TTL.

pub mod client;
pub mod embedded;
pub mod error;
pub mod memory;
pub mod redis;
pub mod resp;
pub mod store;
pub mod tables;

pub use client::{KeySpace, LeaseStoreClient};
pub use embedded::RedbStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis::{RedisConfig, RedisStore};
pub use store::LeaseStore;
