//! Per-namespace cache groups.
//!
//! A group owns a bounded local store and a loader for the canonical data
//! source. `Group::get` serves local hits directly; misses are coalesced so
//! one load per key is in flight at a time, and each load first tries the
//! remote peer owning the key before falling back to the local loader.

mod flight;
mod store;
mod value;

pub use flight::FlightGroup;
pub use store::MemStore;
pub use value::ByteView;

use crate::cluster::PeerRegistry;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Keys are non-empty identifiers by contract; rejected before any I/O.
    #[error("key must not be empty")]
    EmptyKey,

    /// Network failure or non-success status from a peer fetch. Not retried
    /// by this layer.
    #[error("peer fetch failed: {0}")]
    PeerFetch(String),

    /// The canonical data source failed.
    #[error("loader failed: {0}")]
    Loader(String),

    /// The coalesced load was cancelled before completing.
    #[error("load for key {0:?} was interrupted")]
    Interrupted(String),
}

/// Supplies the canonical bytes for a key when no cache, local or remote,
/// holds it.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> Result<Vec<u8>, CacheError>;
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    hits: AtomicU64,
    loads: AtomicU64,
    peer_loads: AtomicU64,
    local_loads: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time snapshot of a group's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub gets: u64,
    pub hits: u64,
    pub loads: u64,
    pub peer_loads: u64,
    pub local_loads: u64,
    pub errors: u64,
}

/// A named partition of the key space with its own loader and local store.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    store: MemStore,
    flights: FlightGroup,
    peers: Arc<PeerRegistry>,
    counters: Counters,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        loader: Arc<dyn Loader>,
        peers: Arc<PeerRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            loader,
            store: MemStore::new(capacity),
            flights: FlightGroup::new(),
            peers,
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> Stats {
        Stats {
            gets: self.counters.gets.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            peer_loads: self.counters.peer_loads.load(Ordering::Relaxed),
            local_loads: self.counters.local_loads.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Resolves `key`: local store hit, else one coalesced load that tries
    /// the owning remote peer and falls back to this group's loader.
    pub async fn get(&self, key: &str) -> Result<ByteView, CacheError> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);

        if key.is_empty() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::EmptyKey);
        }

        if let Some(view) = self.store.get(key) {
            debug!("[{}] hit for {key:?}", self.name);
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(view);
        }

        let result = self.load(key).await;
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn load(&self, key: &str) -> Result<ByteView, CacheError> {
        self.flights
            .run(key, || async {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);

                // A peer owning this key is authoritative for it; a failure
                // talking to that peer surfaces rather than quietly hitting
                // the local loader behind its back.
                if let Some(peer) = self.peers.pick(key) {
                    let bytes = peer.fetch(&self.name, key).await?;
                    self.counters.peer_loads.fetch_add(1, Ordering::Relaxed);

                    let view = ByteView::from(bytes);
                    self.store.add(key, view.clone());
                    return Ok(view);
                }

                let bytes = self.loader.load(key).await?;
                self.counters.local_loads.fetch_add(1, Ordering::Relaxed);

                let view = ByteView::from(bytes);
                self.store.add(key, view.clone());
                Ok(view)
            })
            .await
    }
}

/// Process-wide name-to-group registry, owned by the server state and
/// passed around by handle.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `group` under its name. Re-registering a name replaces the
    /// previous instance.
    pub fn register(&self, group: Arc<Group>) {
        let mut groups = self.groups.write().expect("group registry lock poisoned");

        if groups
            .insert(group.name().to_string(), group.clone())
            .is_some()
        {
            warn!("group {:?} re-registered, previous instance replaced", group.name());
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .read()
            .expect("group registry lock poisoned")
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Loader returning `value:<key>`, counting invocations.
    struct CountingLoader {
        invocations: AtomicU32,
        delay: Duration,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                invocations: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                invocations: AtomicU32::new(0),
                delay,
            }
        }

        fn count(&self) -> u32 {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Loader for CountingLoader {
        async fn load(&self, key: &str) -> Result<Vec<u8>, CacheError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(format!("value:{key}").into_bytes())
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl Loader for FailingLoader {
        async fn load(&self, _key: &str) -> Result<Vec<u8>, CacheError> {
            Err(CacheError::Loader("source is down".into()))
        }
    }

    fn lonely_registry() -> Arc<PeerRegistry> {
        // No peers configured: every key resolves locally.
        Arc::new(PeerRegistry::new("http://localhost:0"))
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected_before_io() {
        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 16, loader.clone(), lonely_registry());

        assert_eq!(group.get("").await, Err(CacheError::EmptyKey));
        assert_eq!(loader.count(), 0);
    }

    #[tokio::test]
    async fn test_miss_falls_through_to_loader_and_populates() {
        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 16, loader.clone(), lonely_registry());

        let view = group.get("alice").await.unwrap();
        assert_eq!(view.as_slice(), b"value:alice");
        assert_eq!(loader.count(), 1);

        // Second get is a local hit; the loader is not consulted again.
        let view = group.get("alice").await.unwrap();
        assert_eq!(view.as_slice(), b"value:alice");
        assert_eq!(loader.count(), 1);

        let stats = group.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.local_loads, 1);
        assert_eq!(stats.peer_loads, 0);
    }

    #[tokio::test]
    async fn test_local_hit_short_circuits() {
        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 16, loader.clone(), lonely_registry());

        group.store.add("alice", ByteView::from("preloaded"));

        let view = group.get("alice").await.unwrap();
        assert_eq!(view.as_slice(), b"preloaded");
        assert_eq!(loader.count(), 0);
    }

    #[tokio::test]
    async fn test_loader_error_propagates_and_nothing_is_cached() {
        let group = Group::new("scores", 16, Arc::new(FailingLoader), lonely_registry());

        let err = group.get("alice").await.unwrap_err();
        assert_eq!(err, CacheError::Loader("source is down".into()));
        assert!(group.store.is_empty());
        assert_eq!(group.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_invoke_the_loader_once() {
        let loader = Arc::new(CountingLoader::slow(Duration::from_millis(100)));
        let group = Arc::new(Group::new(
            "scores",
            16,
            loader.clone(),
            lonely_registry(),
        ));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let group = group.clone();
            tasks.push(tokio::spawn(async move { group.get("alice").await }));
        }

        for task in tasks {
            let view = task.await.unwrap().unwrap();
            assert_eq!(view.as_slice(), b"value:alice");
        }

        assert_eq!(loader.count(), 1);
    }

    #[tokio::test]
    async fn test_peer_transport_failure_surfaces() {
        // The only other peer is unreachable and owns part of the key
        // space; a get for a key it owns must fail loudly, not quietly
        // fall back to the local loader.
        let registry = Arc::new(PeerRegistry::new("http://10.0.0.1:8080"));
        registry.set_peers(["http://10.0.0.1:8080", "http://127.0.0.1:1"]);

        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 16, loader.clone(), registry.clone());

        let remote_key = (0..1000)
            .map(|i| format!("key-{i}"))
            .find(|key| registry.pick(key).is_some())
            .expect("two peers must split ownership");

        let err = group.get(&remote_key).await.unwrap_err();
        assert!(matches!(err, CacheError::PeerFetch(_)), "got {err:?}");
        assert_eq!(loader.count(), 0);
    }

    #[tokio::test]
    async fn test_registry_register_and_lookup() {
        let groups = GroupRegistry::new();
        let registry = lonely_registry();

        groups.register(Arc::new(Group::new(
            "scores",
            16,
            Arc::new(CountingLoader::new()),
            registry.clone(),
        )));

        assert!(groups.lookup("scores").is_some());
        assert!(groups.lookup("unknown").is_none());

        // Same name again: the newer instance wins.
        let replacement = Arc::new(Group::new(
            "scores",
            32,
            Arc::new(CountingLoader::new()),
            registry,
        ));
        groups.register(replacement.clone());

        let looked_up = groups.lookup("scores").unwrap();
        assert!(Arc::ptr_eq(&looked_up, &replacement));
    }
}
