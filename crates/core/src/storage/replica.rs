//! Items and per-item locks owned by one node.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::ItemKey;
use crate::dht::NodeKey;
use crate::error::Result;
use crate::storage::KvStorageInterface;
use crate::storage::MemStorage;

/// A stored value with its version. Version 0 means never written by a quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Key of the item on the ring.
    pub key: ItemKey,
    /// Stored value.
    pub value: String,
    /// Monotonic version, bumped by one on each successful write.
    pub version: u64,
}

impl Item {
    /// Create an item with version 0.
    pub fn new(key: ItemKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            version: 0,
        }
    }

    /// Set version of item.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Keep the copy with the higher version, `self` wins ties.
    pub fn newer(self, other: Item) -> Item {
        if other.version > self.version {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}(v{})", self.key, self.value, self.version)
    }
}

/// Token of one write negotiation, compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    /// Name of the client who issued the update.
    pub owner: String,
    /// Key of the coordinator node.
    pub coordinator: NodeKey,
    /// Request id allocated by the coordinator.
    pub request_id: u64,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.owner, self.coordinator, self.request_id)
    }
}

/// Items and locks of one node.
#[derive(Debug, Default)]
pub struct ReplicaStore {
    items: MemStorage<ItemKey, Item>,
    locks: MemStorage<ItemKey, Lock>,
}

impl ReplicaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            items: MemStorage::new(),
            locks: MemStorage::new(),
        }
    }

    /// Get item by key.
    pub fn item(&self, key: ItemKey) -> Result<Option<Item>> {
        self.items.get(&key)
    }

    /// All items ordered by key.
    pub fn items(&self) -> Result<Vec<Item>> {
        Ok(self.items.get_all()?.into_iter().map(|(_, v)| v).collect())
    }

    /// All item keys in ascending order.
    pub fn item_keys(&self) -> Result<Vec<ItemKey>> {
        Ok(self.items.get_all()?.into_iter().map(|(k, _)| k).collect())
    }

    /// Store an item, replacing any local copy.
    pub fn put(&self, item: Item) -> Result<()> {
        self.items.put(item.key, item)
    }

    /// Store an item unless the local copy has a higher version.
    /// Returns true if the given item was stored.
    pub fn merge(&self, item: Item) -> Result<bool> {
        match self.items.get(&item.key)? {
            Some(local) if local.version > item.version => Ok(false),
            _ => {
                self.put(item)?;
                Ok(true)
            }
        }
    }

    /// Remove item by key.
    pub fn remove(&self, key: ItemKey) -> Result<Option<Item>> {
        self.items.remove(&key)
    }

    /// Version of local copy, 0 if the item is not held.
    pub fn version(&self, key: ItemKey) -> Result<u64> {
        Ok(self.items.get(&key)?.map(|i| i.version).unwrap_or(0))
    }

    /// Lock currently held on item.
    pub fn lock(&self, key: ItemKey) -> Result<Option<Lock>> {
        self.locks.get(&key)
    }

    /// All locks ordered by item key.
    pub fn locks(&self) -> Result<Vec<(ItemKey, Lock)>> {
        self.locks.get_all()
    }

    /// Check no lock is set on item.
    pub fn is_unlocked(&self, key: ItemKey) -> Result<bool> {
        Ok(self.locks.get(&key)?.is_none())
    }

    /// Check `lock` could be granted: no lock held, or the identical lock held.
    pub fn can_grant(&self, key: ItemKey, lock: &Lock) -> Result<bool> {
        Ok(match self.locks.get(&key)? {
            None => true,
            Some(held) => &held == lock,
        })
    }

    /// Record `lock` on item if it could be granted.
    pub fn try_grant(&self, key: ItemKey, lock: &Lock) -> Result<bool> {
        if !self.can_grant(key, lock)? {
            return Ok(false);
        }
        self.locks.put(key, lock.clone())?;
        Ok(true)
    }

    /// Release the lock on item only if it matches `lock`.
    pub fn release_if_matching(&self, key: ItemKey, lock: &Lock) -> Result<bool> {
        match self.locks.get(&key)? {
            Some(held) if &held == lock => {
                self.locks.remove(&key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drop every lock.
    pub fn clear_locks(&self) -> Result<()> {
        self.locks.clear()
    }

    /// Drop every item and lock.
    pub fn clear(&self) -> Result<()> {
        self.items.clear()?;
        self.locks.clear()
    }

    /// Count of held items.
    pub fn count(&self) -> Result<u32> {
        self.items.count()
    }
}
