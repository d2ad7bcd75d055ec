//! Rendezvous hashing ring for stable key-to-endpoint placement.
//!
//! This crate implements highest-random-weight hashing: every node gets a
//! per-key score from `hash(node)` and `hash(key)`, and the highest score
//! owns the key. Unlike modulo placement, changing one node out of N only
//! remaps about 1/N of the keys, which keeps cache and session affinity
//! intact while endpoints come and go.

mod ring;

pub use ring::{HashFn, HashRing, xxh64};
