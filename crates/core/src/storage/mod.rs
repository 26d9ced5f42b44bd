//! Module of MemStorage and the replica store built on it.

pub mod memory;
pub mod replica;

use crate::error::Result;
pub use crate::storage::memory::MemStorage;
pub use crate::storage::replica::Item;
pub use crate::storage::replica::Lock;
pub use crate::storage::replica::ReplicaStore;

/// Key value storage interface
pub trait KvStorageInterface<K, V> {
    /// Get a cache entry by `key`.
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Put `entry` in the cache under `key`.
    fn put(&self, key: K, value: V) -> Result<()>;

    /// Get all entries, ordered by key.
    fn get_all(&self) -> Result<Vec<(K, V)>>;

    /// Remove an `entry` by `key`, returning it.
    fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Delete all values.
    fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    fn count(&self) -> Result<u32>;
}
