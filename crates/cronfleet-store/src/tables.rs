//! redb table definitions for the embedded lease store.
//!
//! Keys are the store keys as-is; values are JSON-serialized
//! `{value, expires_at_ms}` records.

use redb::TableDefinition;

/// TTL-bearing key-value pairs keyed by store key.
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
