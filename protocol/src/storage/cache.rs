//! # Node-Object Cache
//!
//! A two-level cache in front of the node store:
//!
//! - The **positive** level maps hash to a shared `Arc<NodeObject>`.
//! - The **negative** level records hashes known to be absent, so a
//!   repeated miss costs a map lookup instead of a store round-trip. The
//!   acquirer polls for not-yet-fetched hashes every tick; without
//!   negative entries every poll would hit the backend.
//!
//! Inserts are *canonicalizing*: when two threads race to insert the same
//! hash, both end up holding the same `Arc`, so object identity can be
//! compared by pointer anywhere downstream. Reads take a shard read lock;
//! writes take that shard's write lock; a background sweep evicts entries
//! past their time-to-live.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::consensus::clock::Clock;
use crate::crypto::hash::Hash256;
use crate::storage::node_store::NodeObject;

/// Number of lock shards. Hashes are uniform, so a small power of two
/// spreads contention fine.
const SHARD_COUNT: usize = 16;

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// The object, shared with every other holder.
    Hit(Arc<NodeObject>),
    /// We know the store does not have it; don't bother asking.
    KnownAbsent,
    /// The cache has no opinion.
    Miss,
}

#[derive(Default)]
struct Shard {
    positive: HashMap<Hash256, (Arc<NodeObject>, u64)>,
    negative: HashMap<Hash256, u64>,
}

/// Sharded two-level object cache with TTL eviction.
pub struct ObjectCache {
    clock: Arc<dyn Clock>,
    shards: Vec<RwLock<Shard>>,
    ttl_ms: u64,
}

impl ObjectCache {
    /// Create a cache with the given entry time-to-live.
    pub fn new(clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(Shard::default())).collect();
        Self {
            clock,
            shards,
            ttl_ms,
        }
    }

    fn shard(&self, hash: &Hash256) -> &RwLock<Shard> {
        &self.shards[hash[0] as usize % SHARD_COUNT]
    }

    /// Look up a hash.
    pub fn get(&self, hash: &Hash256) -> CacheLookup {
        let shard = self.shard(hash).read();
        if let Some((object, _)) = shard.positive.get(hash) {
            return CacheLookup::Hit(Arc::clone(object));
        }
        if shard.negative.contains_key(hash) {
            return CacheLookup::KnownAbsent;
        }
        CacheLookup::Miss
    }

    /// Insert an object, returning the canonical instance.
    ///
    /// If the hash is already cached, the existing `Arc` wins and the
    /// offered object is dropped; both racers observe the same instance.
    pub fn canonicalize(&self, object: NodeObject) -> Arc<NodeObject> {
        let now = self.clock.monotonic_ms();
        let mut shard = self.shard(&object.hash).write();
        shard.negative.remove(&object.hash);
        match shard.positive.get(&object.hash) {
            Some((existing, _)) => Arc::clone(existing),
            None => {
                let canonical = Arc::new(object);
                shard
                    .positive
                    .insert(canonical.hash, (Arc::clone(&canonical), now));
                canonical
            }
        }
    }

    /// Record that the store definitely does not hold this hash.
    pub fn note_absent(&self, hash: Hash256) {
        let now = self.clock.monotonic_ms();
        let mut shard = self.shard(&hash).write();
        if shard.positive.contains_key(&hash) {
            // A positive entry outranks a stale absence report.
            return;
        }
        shard.negative.insert(hash, now);
    }

    /// Evict entries past their time-to-live.
    pub fn sweep(&self) {
        let now = self.clock.monotonic_ms();
        let ttl = self.ttl_ms;
        for shard in &self.shards {
            let mut shard = shard.write();
            shard
                .positive
                .retain(|_, (_, touched)| now.saturating_sub(*touched) <= ttl);
            shard
                .negative
                .retain(|_, touched| now.saturating_sub(*touched) <= ttl);
        }
    }

    /// (positive, negative) entry counts, for metrics.
    pub fn sizes(&self) -> (usize, usize) {
        let mut positive = 0;
        let mut negative = 0;
        for shard in &self.shards {
            let shard = shard.read();
            positive += shard.positive.len();
            negative += shard.negative.len();
        }
        (positive, negative)
    }
}
