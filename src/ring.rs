// Layer 2 — Consistent hash ring
//
// A point-in-time view of the cluster addressed by hash rather than by
// identity, rebuilt from a membership snapshot every time it changes.
// Grounded on `rusty_db::networking::loadbalancer::strategies::
// consistent_hash::ConsistentHashBalancer` (sorted-ring-plus-binary-search
// shape) and on `original_source/mp2/MP2Node.cpp`'s `findNodes`/`hashFunction`.

use crate::common::Address;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Stable hash of an address's canonical string form, reduced into the ring
/// space. Uses the standard library's default hasher the same way the
/// original relies on `std::hash<string>`: whatever the platform gives you,
/// not a hand-rolled hash function.
pub fn hash_code(addr: &Address, ring_size: u64) -> u64 {
    hash_str(&addr.canonical(), ring_size)
}

/// Hash an arbitrary key (e.g. a store key) into the same ring space.
pub fn hash_key(key: &str, ring_size: u64) -> u64 {
    hash_str(key, ring_size)
}

fn hash_str(s: &str, ring_size: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish() % ring_size.max(1)
}

/// One position on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RingNode {
    pub hash_code: u64,
    pub addr: Address,
}

/// A snapshot of the ring, sorted by `(hash_code, addr)` so ties between
/// colliding hashes resolve deterministically across nodes.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    nodes: Vec<RingNode>,
    ring_size: u64,
}

impl Ring {
    /// Build a ring from a membership snapshot. `members` need not be
    /// sorted or deduplicated by the caller.
    pub fn build(members: &[Address], ring_size: u64) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut nodes: Vec<RingNode> = members
            .iter()
            .filter(|a| seen.insert(**a))
            .map(|a| RingNode { hash_code: hash_code(a, ring_size), addr: *a })
            .collect();
        nodes.sort();
        Self { nodes, ring_size }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ring_size(&self) -> u64 {
        self.ring_size
    }

    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    /// The sorted address list, used to detect whether the ring changed
    /// between ticks without comparing hash codes (spec §5, P8).
    pub fn addresses(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self.nodes.iter().map(|n| n.addr).collect();
        addrs.sort();
        addrs
    }

    /// The three replicas responsible for `key`: the first node whose
    /// hash is `>= hash_code(key)` (wrapping to index 0), plus its two
    /// ring successors. `None` when there are fewer than 3 members.
    pub fn find_replicas(&self, key: &str) -> Option<[RingNode; 3]> {
        if self.nodes.len() < 3 {
            return None;
        }
        let target = hash_key(key, self.ring_size);
        let primary_idx = self
            .nodes
            .iter()
            .position(|n| n.hash_code >= target)
            .unwrap_or(0);
        let n = self.nodes.len();
        Some([
            self.nodes[primary_idx],
            self.nodes[(primary_idx + 1) % n],
            self.nodes[(primary_idx + 2) % n],
        ])
    }

    /// Like [`Ring::find_replicas`] but surfaces the fewer-than-3-members
    /// case as `ClusterError::RingUnavailable` for coordinator-facing
    /// callers that need to log or report it, rather than silently
    /// swallowing it as `None`.
    pub fn find_replicas_checked(&self, key: &str) -> crate::common::Result<[RingNode; 3]> {
        self.find_replicas(key).ok_or(crate::common::ClusterError::RingUnavailable)
    }

    /// The two ring successors and two ring predecessors of `addr`:
    /// `(has_my_replicas, have_replicas_of)`. `None` if `addr` is not on
    /// the ring or there are fewer than 3 members.
    pub fn successors_of(&self, addr: &Address) -> Option<([RingNode; 2], [RingNode; 2])> {
        if self.nodes.len() < 3 {
            return None;
        }
        let idx = self.nodes.iter().position(|n| n.addr == *addr)?;
        let n = self.nodes.len();
        let successors = [self.nodes[(idx + 1) % n], self.nodes[(idx + 2) % n]];
        let predecessors = [self.nodes[(idx + n - 1) % n], self.nodes[(idx + n - 2) % n]];
        Some((successors, predecessors))
    }
}
