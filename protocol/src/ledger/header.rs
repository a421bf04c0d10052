//! # Ledger Headers
//!
//! A ledger is the atomic unit of consensus in PULSAR. Each closed ledger
//! carries the Merkle root of the transaction set that closed it, the
//! state root after application, and a link to its parent, forming a
//! linear hash chain back to genesis.
//!
//! ## Header Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  LedgerHeader                                    │
//! │  ├── seq: u32                                    │
//! │  ├── hash: Hash256        (BLAKE3 of header)     │
//! │  ├── parent_hash: Hash256                        │
//! │  ├── tx_set_root: Hash256 (Merkle root)          │
//! │  ├── state_root: Hash256                         │
//! │  ├── close_time: u64      (network seconds)      │
//! │  ├── close_time_resolution: u32 (seconds)        │
//! │  └── close_flags: u32                            │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! The ledger hash covers every header field except the hash itself,
//! under the `pulsar.ledger` hash domain. Two headers are equal iff their
//! hashes are equal.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{domain_hash, Hash256};

/// Hash domain for ledger headers.
const LEDGER_HASH_DOMAIN: &str = "pulsar.ledger";

/// Close flag: the round closed without agreement on the close time.
/// The recorded close time is the proposer's own clock, rounded, and
/// downstream consumers should treat it as approximate.
pub const CLOSE_FLAG_NO_CONSENSUS_TIME: u32 = 0x01;

/// Genesis anchor message. The protocol's birth certificate, folded into
/// the genesis state root. (Satoshi had "The Times 03/Jan/2009"; we have
/// this.)
pub const GENESIS_ANCHOR_MESSAGE: &[u8] = b"ALAS/2026: Settlement without borders";

/// The close-time resolution every chain starts from, in seconds.
/// Sits in the middle of the resolution ladder so the network can tune
/// in either direction from the first disagreement.
pub const GENESIS_CLOSE_RESOLUTION_SECS: u32 = 30;

// ---------------------------------------------------------------------------
// LedgerHeader
// ---------------------------------------------------------------------------

/// A closed ledger's header. Everything consensus needs to know about a
/// ledger without holding its transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Ledger sequence (0-indexed, genesis = 0).
    pub seq: u32,
    /// BLAKE3 hash of this header's fields.
    pub hash: Hash256,
    /// Hash of the parent ledger's header. All zeros for genesis.
    pub parent_hash: Hash256,
    /// Merkle root of the transaction set that closed this ledger.
    pub tx_set_root: Hash256,
    /// State root after applying the transaction set to the parent state.
    pub state_root: Hash256,
    /// Agreed close time, in network seconds, rounded to the resolution.
    pub close_time: u64,
    /// The close-time resolution this round used, in seconds.
    pub close_time_resolution: u32,
    /// Close flags (see [`CLOSE_FLAG_NO_CONSENSUS_TIME`]).
    pub close_flags: u32,
}

impl LedgerHeader {
    /// Recompute the header hash from its fields.
    ///
    /// Use this to verify that `hash` matches the actual content.
    pub fn compute_hash(&self) -> Hash256 {
        compute_header_hash(
            self.seq,
            &self.parent_hash,
            &self.tx_set_root,
            &self.state_root,
            self.close_time,
            self.close_time_resolution,
            self.close_flags,
        )
    }

    /// Return the ledger hash as a hex string.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A full closed ledger: the header plus the ids of the transactions that
/// closed it.
///
/// The transaction bodies themselves live in the node store; consensus
/// only needs the ids for membership queries and re-serving `GetLedger`
/// requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Ledger metadata and chain linkage.
    pub header: LedgerHeader,
    /// Sorted ids of the transactions in this ledger's transaction set.
    pub tx_ids: Vec<Hash256>,
}

impl Ledger {
    /// Construct the genesis ledger.
    ///
    /// Height 0, zeroed parent hash, empty transaction set, close time 0.
    /// The state root anchors the genesis message, so every chain built on
    /// top of it inherits the protocol's origin.
    pub fn genesis() -> Self {
        let state_root = domain_hash("pulsar.genesis", GENESIS_ANCHOR_MESSAGE);
        let tx_set_root = [0u8; 32];

        let hash = compute_header_hash(
            0,
            &[0u8; 32],
            &tx_set_root,
            &state_root,
            0,
            GENESIS_CLOSE_RESOLUTION_SECS,
            0,
        );

        Ledger {
            header: LedgerHeader {
                seq: 0,
                hash,
                parent_hash: [0u8; 32],
                tx_set_root,
                state_root,
                close_time: 0,
                close_time_resolution: GENESIS_CLOSE_RESOLUTION_SECS,
                close_flags: 0,
            },
            tx_ids: Vec::new(),
        }
    }

    /// Construct a new closed ledger on top of a parent header.
    ///
    /// Sequence and parent hash are derived from the parent; everything
    /// else is the outcome of the consensus round that closed this ledger.
    pub fn close(
        parent: &LedgerHeader,
        tx_set_root: Hash256,
        tx_ids: Vec<Hash256>,
        state_root: Hash256,
        close_time: u64,
        close_time_resolution: u32,
        close_flags: u32,
    ) -> Self {
        let seq = parent.seq + 1;
        let hash = compute_header_hash(
            seq,
            &parent.hash,
            &tx_set_root,
            &state_root,
            close_time,
            close_time_resolution,
            close_flags,
        );

        Ledger {
            header: LedgerHeader {
                seq,
                hash,
                parent_hash: parent.hash,
                tx_set_root,
                state_root,
                close_time,
                close_time_resolution,
                close_flags,
            },
            tx_ids,
        }
    }

    /// Verify ledger integrity: the stored hash must match the recomputed
    /// hash, and genesis must have a zeroed parent.
    ///
    /// Signature checks are not done here; ledgers are not signed objects,
    /// validations over them are.
    pub fn verify(&self) -> Result<(), String> {
        let expected = self.header.compute_hash();
        if self.header.hash != expected {
            return Err(format!(
                "ledger {} hash mismatch: stored={}, computed={}",
                self.header.seq,
                hex::encode(self.header.hash),
                hex::encode(expected),
            ));
        }

        if self.header.seq == 0 && self.header.parent_hash != [0u8; 32] {
            return Err("genesis ledger must have zeroed parent_hash".to_string());
        }

        Ok(())
    }

    /// Return the ledger sequence.
    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Return the ledger hash.
    pub fn hash(&self) -> Hash256 {
        self.header.hash
    }
}

// ---------------------------------------------------------------------------
// Hash Computation
// ---------------------------------------------------------------------------

/// Compute the domain-separated hash of a ledger header from its fields.
/// The hash field itself is excluded; it is the output, not an input.
#[allow(clippy::too_many_arguments)]
fn compute_header_hash(
    seq: u32,
    parent_hash: &Hash256,
    tx_set_root: &Hash256,
    state_root: &Hash256,
    close_time: u64,
    close_time_resolution: u32,
    close_flags: u32,
) -> Hash256 {
    let mut preimage = Vec::with_capacity(116);
    preimage.extend_from_slice(&seq.to_le_bytes());
    preimage.extend_from_slice(parent_hash);
    preimage.extend_from_slice(tx_set_root);
    preimage.extend_from_slice(state_root);
    preimage.extend_from_slice(&close_time.to_le_bytes());
    preimage.extend_from_slice(&close_time_resolution.to_le_bytes());
    preimage.extend_from_slice(&close_flags.to_le_bytes());
    domain_hash(LEDGER_HASH_DOMAIN, &preimage)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_properties() {
        let genesis = Ledger::genesis();
        assert_eq!(genesis.seq(), 0);
        assert_eq!(genesis.header.parent_hash, [0u8; 32]);
        assert_eq!(genesis.header.close_time, 0);
        assert!(genesis.tx_ids.is_empty());
    }

    #[test]
    fn genesis_verifies() {
        assert!(Ledger::genesis().verify().is_ok());
    }

    #[test]
    fn genesis_hash_is_deterministic() {
        assert_eq!(Ledger::genesis().hash(), Ledger::genesis().hash());
    }

    #[test]
    fn close_links_to_parent() {
        let genesis = Ledger::genesis();
        let next = Ledger::close(
            &genesis.header,
            [1u8; 32],
            vec![[9u8; 32]],
            [2u8; 32],
            100,
            30,
            0,
        );

        assert_eq!(next.seq(), 1);
        assert_eq!(next.header.parent_hash, genesis.hash());
        assert!(next.verify().is_ok());
    }

    #[test]
    fn tampered_ledger_fails_verification() {
        let genesis = Ledger::genesis();
        let mut next = Ledger::close(&genesis.header, [0u8; 32], vec![], [0u8; 32], 100, 30, 0);
        next.header.hash[0] ^= 0xFF;
        assert!(next.verify().is_err());
    }

    #[test]
    fn hash_covers_close_time() {
        let genesis = Ledger::genesis();
        let a = Ledger::close(&genesis.header, [0u8; 32], vec![], [0u8; 32], 100, 30, 0);
        let b = Ledger::close(&genesis.header, [0u8; 32], vec![], [0u8; 32], 130, 30, 0);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_covers_close_flags() {
        let genesis = Ledger::genesis();
        let agreed = Ledger::close(&genesis.header, [0u8; 32], vec![], [0u8; 32], 100, 30, 0);
        let disputed = Ledger::close(
            &genesis.header,
            [0u8; 32],
            vec![],
            [0u8; 32],
            100,
            30,
            CLOSE_FLAG_NO_CONSENSUS_TIME,
        );
        assert_ne!(agreed.hash(), disputed.hash());
    }

    #[test]
    fn chain_of_three() {
        let l0 = Ledger::genesis();
        let l1 = Ledger::close(&l0.header, [1u8; 32], vec![], [1u8; 32], 100, 30, 0);
        let l2 = Ledger::close(&l1.header, [2u8; 32], vec![], [2u8; 32], 130, 30, 0);

        assert_eq!(l2.seq(), 2);
        assert_eq!(l2.header.parent_hash, l1.hash());
        assert_eq!(l1.header.parent_hash, l0.hash());
        assert!(l0.verify().is_ok());
        assert!(l1.verify().is_ok());
        assert!(l2.verify().is_ok());
    }

    #[test]
    fn serialization_roundtrip() {
        let genesis = Ledger::genesis();
        let bytes = bincode::serialize(&genesis).expect("serialize");
        let recovered: Ledger = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(genesis, recovered);
    }
}
