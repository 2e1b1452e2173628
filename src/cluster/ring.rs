use std::collections::HashMap;

/// Hash function mapping arbitrary bytes onto the ring's 32-bit key space.
pub type HashFn = fn(&[u8]) -> u32;

/// Consistent-hash ring with virtual nodes.
///
/// Every real peer contributes `virtual_nodes` positions on the ring, which
/// smooths the share of the key space each peer owns. Routing is fully
/// deterministic: two rings built with the same peers, hash function and
/// virtual-node count agree on the owner of every key, so nodes never have
/// to coordinate placement decisions.
///
/// Hash collisions between virtual nodes are not deduplicated; a collision
/// silently drops one peer's coverage at that slot, which is acceptable for
/// small clusters.
pub struct HashRing {
    virtual_nodes: usize,
    hash: HashFn,
    ring: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Ring hashing with the default CRC-32 hash.
    pub fn new(virtual_nodes: usize) -> Self {
        Self::with_hasher(virtual_nodes, crc32fast::hash)
    }

    pub fn with_hasher(virtual_nodes: usize, hash: HashFn) -> Self {
        assert!(virtual_nodes >= 1, "ring needs at least one virtual node per peer");

        Self {
            virtual_nodes,
            hash,
            ring: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Adds peers to the ring. Positions for all peers are inserted first
    /// and the ring is sorted once at the end.
    pub fn add_peers<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer = peer.into();

            for i in 0..self.virtual_nodes {
                let position = (self.hash)(format!("{i}{peer}").as_bytes());
                self.ring.push(position);
                self.owners.insert(position, peer.clone());
            }
        }

        self.ring.sort_unstable();
    }

    /// Returns the peer owning `key`, or `None` when the ring is empty.
    ///
    /// The owner is the first virtual node at or after the key's hash,
    /// wrapping around to the start of the ring past the last position.
    pub fn locate(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.ring.partition_point(|&position| position < hash);
        let slot = if idx == self.ring.len() {
            self.ring[0]
        } else {
            self.ring[idx]
        };

        self.owners.get(&slot).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
