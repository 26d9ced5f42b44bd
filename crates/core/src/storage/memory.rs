use std::hash::Hash;

use dashmap::DashMap;

use crate::error::Result;
use crate::storage::KvStorageInterface;

/// In-memory storage, content is lost when the node is dropped.
#[derive(Debug)]
pub struct MemStorage<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    table: DashMap<K, V>,
}

impl<K, V> MemStorage<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty storage.
    pub fn new() -> Self {
        Self {
            table: DashMap::default(),
        }
    }
}

impl<K, V> Default for MemStorage<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KvStorageInterface<K, V> for MemStorage<K, V>
where
    K: Eq + Hash + Ord + Clone,
    V: Clone,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.table.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        self.table.insert(key, value);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<(K, V)>> {
        let mut entries: Vec<(K, V)> = self
            .table
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.table.remove(key).map(|(_, v)| v))
    }

    fn clear(&self) -> Result<()> {
        self.table.clear();
        Ok(())
    }

    fn count(&self) -> Result<u32> {
        Ok(self.table.len() as u32)
    }
}
