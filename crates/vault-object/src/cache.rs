//! LRU cache for parsed objects.

use std::num::NonZeroUsize;

use lru::LruCache;
use vault_hash::ObjectId;

use crate::Object;

/// Count-bounded LRU of parsed objects.
pub struct ObjectCache {
    cache: LruCache<ObjectId, Object>,
}

impl ObjectCache {
    /// Create with the given capacity in objects.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get an object, promoting it to most-recently-used.
    pub fn get(&mut self, id: &ObjectId) -> Option<&Object> {
        self.cache.get(id)
    }

    /// Insert an object, returning the evicted entry if the cache was full.
    pub fn insert(&mut self, id: ObjectId, obj: Object) -> Option<(ObjectId, Object)> {
        self.cache.push(id, obj)
    }

    /// Drop one entry, if present.
    pub fn invalidate(&mut self, id: &ObjectId) {
        self.cache.pop(id);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
