//! # Ledger History
//!
//! The in-memory view of the chain: every ledger we hold by hash, the
//! header table by sequence, and the pointer to the last closed ledger.
//!
//! Ledgers are shared as `Arc<Ledger>`; whoever needs the LCL holds a
//! clone and it lives exactly as long as its longest reader. Headers
//! reference parents by hash only, so nothing here can form a cycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::crypto::hash::Hash256;
use crate::ledger::header::{Ledger, LedgerHeader};

struct Inner {
    by_hash: HashMap<Hash256, Arc<Ledger>>,
    by_seq: BTreeMap<u32, LedgerHeader>,
    lcl: Arc<Ledger>,
}

/// Thread-safe ledger history with the LCL pointer.
pub struct LedgerHistory {
    inner: RwLock<Inner>,
}

impl LedgerHistory {
    /// A history seeded with genesis as the LCL.
    pub fn new() -> Self {
        let genesis = Arc::new(Ledger::genesis());
        let mut by_hash = HashMap::new();
        by_hash.insert(genesis.hash(), Arc::clone(&genesis));
        let mut by_seq = BTreeMap::new();
        by_seq.insert(0, genesis.header.clone());

        Self {
            inner: RwLock::new(Inner {
                by_hash,
                by_seq,
                lcl: genesis,
            }),
        }
    }

    /// Insert a ledger, returning the shared instance. Re-inserting a
    /// known hash returns the existing instance.
    pub fn insert(&self, ledger: Ledger) -> Arc<Ledger> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_hash.get(&ledger.hash()) {
            return Arc::clone(existing);
        }
        let shared = Arc::new(ledger);
        inner.by_seq.insert(shared.seq(), shared.header.clone());
        inner.by_hash.insert(shared.hash(), Arc::clone(&shared));
        shared
    }

    /// Fetch a ledger by hash.
    pub fn get(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        self.inner.read().by_hash.get(hash).cloned()
    }

    /// Do we hold this ledger?
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.inner.read().by_hash.contains_key(hash)
    }

    /// Header at a sequence, if we have closed or fetched that height.
    pub fn header_at(&self, seq: u32) -> Option<LedgerHeader> {
        self.inner.read().by_seq.get(&seq).cloned()
    }

    /// The last closed ledger.
    pub fn lcl(&self) -> Arc<Ledger> {
        Arc::clone(&self.inner.read().lcl)
    }

    /// Advance the LCL to a ledger we hold. Returns the new LCL, or
    /// `None` if the hash is unknown (fetch it first).
    pub fn set_lcl(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        let mut inner = self.inner.write();
        let ledger = inner.by_hash.get(hash).cloned()?;
        info!(
            seq = ledger.seq(),
            hash = %hex::encode(ledger.hash()),
            "last closed ledger advanced"
        );
        inner.lcl = Arc::clone(&ledger);
        Some(ledger)
    }

    /// Number of ledgers held.
    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    /// Always false: genesis is permanent.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for LedgerHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_genesis() {
        let history = LedgerHistory::new();
        let lcl = history.lcl();
        assert_eq!(lcl.seq(), 0);
        assert!(history.contains(&lcl.hash()));
        assert_eq!(history.header_at(0).unwrap().hash, lcl.hash());
    }

    #[test]
    fn insert_and_advance_lcl() {
        let history = LedgerHistory::new();
        let genesis = history.lcl();
        let next = Ledger::close(&genesis.header, [1u8; 32], vec![], [2u8; 32], 100, 30, 0);
        let hash = next.hash();

        history.insert(next);
        let lcl = history.set_lcl(&hash).expect("ledger is held");
        assert_eq!(lcl.seq(), 1);
        assert_eq!(history.lcl().hash(), hash);
    }

    #[test]
    fn set_lcl_refuses_unknown_hash() {
        let history = LedgerHistory::new();
        assert!(history.set_lcl(&[9u8; 32]).is_none());
        // LCL unchanged.
        assert_eq!(history.lcl().seq(), 0);
    }

    #[test]
    fn insert_is_canonicalizing() {
        let history = LedgerHistory::new();
        let genesis = history.lcl();
        let ledger = Ledger::close(&genesis.header, [1u8; 32], vec![], [2u8; 32], 100, 30, 0);

        let first = history.insert(ledger.clone());
        let second = history.insert(ledger);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn lcl_advance_is_chain_linked() {
        // Walking the chain from the new LCL reaches the old one by
        // parent hash.
        let history = LedgerHistory::new();
        let genesis = history.lcl();
        let l1 = Ledger::close(&genesis.header, [1u8; 32], vec![], [1u8; 32], 100, 30, 0);
        let l1_hash = l1.hash();
        history.insert(l1);
        history.set_lcl(&l1_hash);

        let lcl = history.lcl();
        assert_eq!(lcl.header.parent_hash, genesis.hash());
        assert_eq!(lcl.seq(), genesis.seq() + 1);
    }
}
