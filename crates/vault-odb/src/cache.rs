//! Bytes-capped content cache over a raw store.
//!
//! Coherence is weak: an entry may be served stale briefly after a
//! concurrent mutation and re-fetched on the next miss. Mutations through
//! this wrapper invalidate the affected key.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use vault_hash::ObjectId;
use vault_raw::{RawError, RawStore};

pub struct CachingStore<S> {
    inner: S,
    cache: Mutex<LruCache<ObjectId, Vec<u8>>>,
    /// Soft cap on total cached bytes.
    byte_cap: usize,
    bytes_held: Mutex<usize>,
}

impl<S: RawStore> CachingStore<S> {
    /// Wrap a store with a cache bounded by `byte_cap` total bytes.
    pub fn new(inner: S, byte_cap: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::unbounded()),
            byte_cap,
            bytes_held: Mutex::new(0),
        }
    }

    /// Wrap with a count bound instead of a byte bound.
    pub fn with_entry_cap(inner: S, entries: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(entries.max(1)).expect("nonzero capacity"),
            )),
            byte_cap: usize::MAX,
            bytes_held: Mutex::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn insert(&self, id: ObjectId, bytes: Vec<u8>) {
        if bytes.len() > self.byte_cap {
            return;
        }
        let mut held = self.bytes_held.lock().expect("cache accounting poisoned");
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        *held += bytes.len();
        cache.put(id, bytes);
        while *held > self.byte_cap {
            match cache.pop_lru() {
                Some((_, evicted)) => *held -= evicted.len(),
                None => break,
            }
        }
    }

    fn invalidate(&self, id: &ObjectId) {
        let mut held = self.bytes_held.lock().expect("cache accounting poisoned");
        if let Some(old) = self.cache.lock().expect("cache lock poisoned").pop(id) {
            *held -= old.len();
        }
    }
}

impl<S: RawStore> RawStore for CachingStore<S> {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError> {
        self.invalidate(id);
        self.inner.store(id, bytes)
    }

    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        if let Some(hit) = self.cache.lock().expect("cache lock poisoned").get(id) {
            return Ok(Some(hit.clone()));
        }
        let loaded = self.inner.load(id)?;
        if let Some(ref bytes) = loaded {
            self.insert(*id, bytes.clone());
        }
        Ok(loaded)
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.cache.lock().expect("cache lock poisoned").contains(id) || self.inner.has(id)
    }

    fn remove(&self, id: &ObjectId) -> Result<bool, RawError> {
        self.invalidate(id);
        self.inner.remove(id)
    }

    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        self.inner.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_raw::MemoryStore;

    fn id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from(bytes)
    }

    #[test]
    fn caches_loads() {
        let store = CachingStore::new(MemoryStore::new(), 1024);
        store.store(&id(1), b"value").unwrap();
        assert_eq!(store.load(&id(1)).unwrap().unwrap(), b"value");

        // Mutating the inner store directly leaves the cache stale, which
        // the weak-coherence contract allows.
        store.inner().remove(&id(1)).unwrap();
        assert_eq!(store.load(&id(1)).unwrap().unwrap(), b"value");
    }

    #[test]
    fn remove_invalidates() {
        let store = CachingStore::new(MemoryStore::new(), 1024);
        store.store(&id(1), b"value").unwrap();
        store.load(&id(1)).unwrap();
        store.remove(&id(1)).unwrap();
        assert!(store.load(&id(1)).unwrap().is_none());
    }

    #[test]
    fn byte_cap_evicts_lru() {
        let store = CachingStore::new(MemoryStore::new(), 10);
        store.store(&id(1), b"aaaaaa").unwrap();
        store.store(&id(2), b"bbbbbb").unwrap();
        store.load(&id(1)).unwrap();
        store.load(&id(2)).unwrap();

        // Only one six-byte value fits under the ten-byte cap.
        let cached = store.cache.lock().unwrap().len();
        assert_eq!(cached, 1);
    }

    #[test]
    fn oversized_values_bypass_cache() {
        let store = CachingStore::new(MemoryStore::new(), 4);
        store.store(&id(1), b"way too large").unwrap();
        store.load(&id(1)).unwrap();
        assert_eq!(store.cache.lock().unwrap().len(), 0);
    }
}
