//! Peer routing: who owns which key, and how to reach them.
//!
//! Key ownership comes from a consistent-hash ring over the configured peer
//! addresses. The registry never routes to this node's own address; a key
//! the ring assigns to us resolves locally instead, otherwise the server and
//! client on the same process would recurse into each other.

mod client;
mod ring;

pub use client::PeerClient;
pub use ring::{HashFn, HashRing};

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// URL prefix under which peers serve cache entries.
pub const DEFAULT_BASE_PATH: &str = "/_cache/";

/// Virtual nodes per peer on the ring.
pub const DEFAULT_VIRTUAL_NODES: usize = 50;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct PeerSet {
    ring: HashRing,
    clients: HashMap<String, Arc<PeerClient>>,
}

/// Holds the current peer set and resolves keys to remote peers.
///
/// The ring and the per-peer clients are replaced wholesale on
/// reconfiguration under the write lock; readers never observe a
/// half-updated set.
pub struct PeerRegistry {
    self_address: String,
    base_path: String,
    virtual_nodes: usize,
    http: reqwest::Client,
    peers: RwLock<PeerSet>,
}

impl PeerRegistry {
    pub fn new(self_address: impl Into<String>) -> Self {
        Self::with_base_path(self_address, DEFAULT_BASE_PATH)
    }

    pub fn with_base_path(self_address: impl Into<String>, base_path: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("failed to build http client");

        Self {
            self_address: self_address.into(),
            base_path: base_path.into(),
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            http,
            peers: RwLock::new(PeerSet {
                ring: HashRing::new(DEFAULT_VIRTUAL_NODES),
                clients: HashMap::new(),
            }),
        }
    }

    /// Overrides the virtual-node count used for subsequent `set_peers`
    /// calls. All nodes in a cluster must agree on it.
    pub fn with_virtual_nodes(mut self, virtual_nodes: usize) -> Self {
        self.virtual_nodes = virtual_nodes;
        self
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Replaces the peer set. `peers` is the full cluster list and normally
    /// includes this node's own address so all nodes agree on ownership.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = HashRing::new(self.virtual_nodes);
        ring.add_peers(peers.iter().cloned());

        let clients = peers
            .into_iter()
            .map(|peer| {
                let base = format!("{}{}", peer, self.base_path);
                let client = Arc::new(PeerClient::new(base, self.http.clone()));
                (peer, client)
            })
            .collect();

        let mut current = self.peers.write().expect("peer registry lock poisoned");
        *current = PeerSet { ring, clients };
    }

    /// Returns the client for the remote peer owning `key`, or `None` when
    /// the key is owned by this node or no peers are configured.
    pub fn pick(&self, key: &str) -> Option<Arc<PeerClient>> {
        let peers = self.peers.read().expect("peer registry lock poisoned");

        let owner = peers.ring.locate(key)?;
        if owner == self.self_address {
            return None;
        }

        debug!("picked peer {owner} for key {key:?}");
        peers.clients.get(owner).cloned()
    }
}
