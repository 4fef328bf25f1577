//! Hot-path container aliases used by the keyspace and its callers.
//!
//! Container choices stay centralized in one place so allocator/container upgrades never touch
//! command logic modules.

use hashbrown::{HashMap as HbMap, HashSet as HbSet};

/// Hot-path hash map used by keyspace tables and field maps.
pub type HotMap<K, V> = HbMap<K, V>;

/// Hot-path hash set used for scan deduplication.
pub type HotSet<T> = HbSet<T>;
