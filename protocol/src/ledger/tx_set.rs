//! # Transaction Sets
//!
//! An unordered set of opaque transactions, identified as a whole by a
//! single Merkle root. This is the object validators actually vote on:
//! a proposal says "I want to close the ledger with exactly this set",
//! naming it by root.
//!
//! The consensus core never interprets transaction contents. A transaction
//! is a blob; its id is the domain-separated BLAKE3 hash of the blob. The
//! set supports the three operations consensus needs: membership, root
//! computation, and symmetric difference (which seeds the per-transaction
//! dispute votes when two proposals disagree).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{domain_hash, merkle_root, Hash256};

/// Hash domain for transaction ids.
const TX_ID_DOMAIN: &str = "pulsar.tx";

/// An unordered set of opaque transactions keyed by their id hash.
///
/// Backed by a `BTreeMap` so iteration order is the sorted id order; the
/// Merkle root is computed over exactly that order, which makes the root
/// canonical without a separate sort step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSet {
    txs: BTreeMap<Hash256, Vec<u8>>,
}

impl TxSet {
    /// Creates an empty transaction set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the id of a transaction blob.
    pub fn tx_id(blob: &[u8]) -> Hash256 {
        domain_hash(TX_ID_DOMAIN, blob)
    }

    /// Insert a transaction blob, returning its id.
    ///
    /// Inserting the same blob twice is a no-op with the same id; the set
    /// is a set.
    pub fn insert(&mut self, blob: Vec<u8>) -> Hash256 {
        let id = Self::tx_id(&blob);
        self.txs.insert(id, blob);
        id
    }

    /// Insert a transaction under a caller-provided id.
    ///
    /// Used when reassembling a set from `LedgerData` chunks, where the id
    /// arrives alongside the blob. Returns `false` (and stores nothing) if
    /// the id does not match the blob, which is how a lying peer gets
    /// caught.
    pub fn insert_raw(&mut self, id: Hash256, blob: Vec<u8>) -> bool {
        if Self::tx_id(&blob) != id {
            return false;
        }
        self.txs.insert(id, blob);
        true
    }

    /// Is transaction `id` a member of this set?
    pub fn contains(&self, id: &Hash256) -> bool {
        self.txs.contains_key(id)
    }

    /// Fetch a transaction blob by id.
    pub fn get(&self, id: &Hash256) -> Option<&[u8]> {
        self.txs.get(id).map(|b| b.as_slice())
    }

    /// Remove a transaction by id.
    pub fn remove(&mut self, id: &Hash256) -> bool {
        self.txs.remove(id).is_some()
    }

    /// The ids in this set, in sorted order.
    pub fn ids(&self) -> Vec<Hash256> {
        self.txs.keys().copied().collect()
    }

    /// Iterate over (id, blob) pairs in sorted id order.
    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &Vec<u8>)> {
        self.txs.iter()
    }

    /// Number of transactions in the set.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Returns true if the set holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Compute the Merkle root identifying this set.
    ///
    /// Leaves are the sorted transaction ids. An empty set has the all-zero
    /// root, matching the empty-ledger convention in the header.
    pub fn root(&self) -> Hash256 {
        let leaves: Vec<Hash256> = self.txs.keys().copied().collect();
        merkle_root(&leaves)
    }

    /// Symmetric difference against another set.
    ///
    /// Returns `(id, in_self)` pairs: `true` means the transaction is in
    /// this set but not `other`, `false` the reverse. Transactions in both
    /// sets are not reported. This is exactly the input the round driver
    /// needs to open a dispute per differing transaction.
    pub fn differences(&self, other: &TxSet) -> Vec<(Hash256, bool)> {
        let mut diffs = Vec::new();
        for id in self.txs.keys() {
            if !other.contains(id) {
                diffs.push((*id, true));
            }
        }
        for id in other.txs.keys() {
            if !self.contains(id) {
                diffs.push((*id, false));
            }
        }
        diffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(tag: u8) -> Vec<u8> {
        vec![tag; 16]
    }

    #[test]
    fn empty_set_has_zero_root() {
        assert_eq!(TxSet::new().root(), [0u8; 32]);
    }

    #[test]
    fn insert_and_contains() {
        let mut set = TxSet::new();
        let id = set.insert(blob(1));
        assert!(set.contains(&id));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&id), Some(blob(1).as_slice()));
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let mut set = TxSet::new();
        let a = set.insert(blob(1));
        let b = set.insert(blob(1));
        assert_eq!(a, b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn root_is_order_independent() {
        // Sets built in different insertion orders must agree on the root;
        // validators insert in arrival order, which nobody controls.
        let mut a = TxSet::new();
        a.insert(blob(1));
        a.insert(blob(2));
        a.insert(blob(3));

        let mut b = TxSet::new();
        b.insert(blob(3));
        b.insert(blob(1));
        b.insert(blob(2));

        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn root_changes_with_membership() {
        let mut a = TxSet::new();
        a.insert(blob(1));
        let root_one = a.root();
        a.insert(blob(2));
        assert_ne!(a.root(), root_one);
    }

    #[test]
    fn insert_raw_rejects_wrong_id() {
        let mut set = TxSet::new();
        assert!(!set.insert_raw([0xAB; 32], blob(1)));
        assert!(set.is_empty());

        let id = TxSet::tx_id(&blob(1));
        assert!(set.insert_raw(id, blob(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn differences_both_directions() {
        let mut ours = TxSet::new();
        let only_ours = ours.insert(blob(1));
        let shared = ours.insert(blob(2));

        let mut theirs = TxSet::new();
        theirs.insert(blob(2));
        let only_theirs = theirs.insert(blob(3));

        let diffs = ours.differences(&theirs);
        assert_eq!(diffs.len(), 2);
        assert!(diffs.contains(&(only_ours, true)));
        assert!(diffs.contains(&(only_theirs, false)));
        assert!(!diffs.iter().any(|(id, _)| *id == shared));
    }

    #[test]
    fn differences_of_identical_sets_is_empty() {
        let mut a = TxSet::new();
        a.insert(blob(1));
        let b = a.clone();
        assert!(a.differences(&b).is_empty());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut set = TxSet::new();
        set.insert(blob(1));
        set.insert(blob(2));

        let bytes = bincode::serialize(&set).expect("serialize");
        let recovered: TxSet = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(set, recovered);
        assert_eq!(set.root(), recovered.root());
    }
}
