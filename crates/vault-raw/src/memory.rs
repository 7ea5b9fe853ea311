use std::collections::BTreeMap;
use std::sync::RwLock;

use vault_hash::ObjectId;

use crate::{RawError, RawStore};

/// In-memory store backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<ObjectId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes held, for tests and accounting.
    pub fn total_bytes(&self) -> usize {
        self.entries
            .read()
            .expect("memory store lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl RawStore for MemoryStore {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError> {
        let mut entries = self.entries.write().expect("memory store lock poisoned");
        entries.entry(*id).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        let entries = self.entries.read().expect("memory store lock poisoned");
        Ok(entries.get(id).cloned())
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.entries
            .read()
            .expect("memory store lock poisoned")
            .contains_key(id)
    }

    fn remove(&self, id: &ObjectId) -> Result<bool, RawError> {
        let mut entries = self.entries.write().expect("memory store lock poisoned");
        Ok(entries.remove(id).is_some())
    }

    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        let entries = self.entries.read().expect("memory store lock poisoned");
        Ok(entries.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from(bytes)
    }

    #[test]
    fn keys_are_sorted() {
        let store = MemoryStore::new();
        store.store(&id(3), b"c").unwrap();
        store.store(&id(1), b"a").unwrap();
        store.store(&id(2), b"b").unwrap();
        assert_eq!(store.keys().unwrap(), vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn total_bytes_tracks_values() {
        let store = MemoryStore::new();
        store.store(&id(1), b"12345").unwrap();
        store.store(&id(2), b"123").unwrap();
        assert_eq!(store.total_bytes(), 8);
    }

    #[test]
    fn first_store_wins() {
        let store = MemoryStore::new();
        store.store(&id(1), b"first").unwrap();
        store.store(&id(1), b"second").unwrap();
        assert_eq!(store.load(&id(1)).unwrap().unwrap(), b"first");
    }
}
