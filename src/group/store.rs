use crate::group::value::ByteView;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Capacity-bounded local store, least-recently-used eviction.
///
/// Safe for concurrent get/add from multiple callers; the lock is held only
/// for the map operation itself.
pub struct MemStore {
    entries: Mutex<LruCache<String, ByteView>>,
}

impl MemStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");

        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn add(&self, key: &str, value: ByteView) {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .put(key.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
