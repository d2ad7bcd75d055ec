//! Rendezvous hashing ring implementation.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

/// Hash function used to place nodes and keys.
///
/// Must be deterministic across processes: placements are expected to
/// survive restarts.
pub type HashFn = fn(&[u8]) -> u64;

/// Default hash: XXH64 with seed 0.
pub fn xxh64(data: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(data, 0)
}

/// Immutable rendezvous (highest-random-weight) hashing ring.
///
/// For every key, each node gets a score derived from `hash(node)` and
/// `hash(key)`; the node with the highest score wins. Changing one node out
/// of N only moves the keys that node won (or now wins), roughly 1/N of them.
///
/// A ring is built once per node set and never mutated. Equal scores are
/// broken by lexicographic node order, so results are reproducible even on
/// a 64-bit collision.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Unique nodes, in the order they were first given.
    nodes: Vec<String>,
    /// `hasher(node)` for each entry of `nodes`.
    hashes: Vec<u64>,
    hasher: HashFn,
}

impl HashRing {
    /// Build a ring over `nodes` using XXH64.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_hasher(nodes, xxh64)
    }

    /// Build a ring with an explicit hash function.
    ///
    /// Duplicate nodes are collapsed; the first occurrence keeps its position.
    pub fn with_hasher<I, S>(nodes: I, hasher: HashFn) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let nodes: Vec<String> = nodes
            .into_iter()
            .map(Into::into)
            .filter(|n| seen.insert(n.clone()))
            .collect();
        let hashes = nodes.iter().map(|n| hasher(n.as_bytes())).collect();

        debug!(nodes = nodes.len(), "built hash ring");
        Self {
            nodes,
            hashes,
            hasher,
        }
    }

    /// Return the node that owns `key`, or `None` if the ring is empty.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let key_hash = (self.hasher)(key.as_bytes());

        let mut best: Option<(u64, &str)> = None;
        for (node, node_hash) in self.nodes.iter().zip(&self.hashes) {
            let candidate = (score(key_hash, *node_hash), node.as_str());
            match best {
                Some(current) if rank(&current, &candidate) != Ordering::Greater => {}
                _ => best = Some(candidate),
            }
        }

        best.map(|(_, node)| node)
    }

    /// Return the `n` highest-ranked distinct nodes for `key`, best first.
    ///
    /// If `n` is at least the ring size, every node is returned in rank order.
    /// The first element always equals [`HashRing::lookup`].
    pub fn lookup_n(&self, key: &str, n: usize) -> Vec<&str> {
        let key_hash = (self.hasher)(key.as_bytes());

        let mut scored: Vec<(u64, &str)> = self
            .nodes
            .iter()
            .zip(&self.hashes)
            .map(|(node, node_hash)| (score(key_hash, *node_hash), node.as_str()))
            .collect();
        scored.sort_unstable_by(rank);
        scored.truncate(n);

        scored.into_iter().map(|(_, node)| node).collect()
    }

    /// Return every node on the ring, in construction order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Return the number of nodes on the ring.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Ordering where the better candidate sorts first: higher score, then the
/// lexicographically smaller node.
fn rank(a: &(u64, &str), b: &(u64, &str)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

/// Combine a key hash and a node hash into a well-mixed score.
///
/// XOR alone keeps too much structure from the inputs, so the result goes
/// through an xorshift-multiply round.
fn score(key_hash: u64, node_hash: u64) -> u64 {
    let mut x = key_hash ^ node_hash;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x.wrapping_mul(2_685_821_657_736_338_717)
}
