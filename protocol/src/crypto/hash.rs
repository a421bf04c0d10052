//! # Hashing Utilities
//!
//! Content identification for PULSAR. Two hash functions, two rules:
//!
//! - **BLAKE3** computes every protocol hash, and every protocol hash is
//!   computed under a named domain. There is deliberately no "plain"
//!   BLAKE3 helper in this crate: a hash you cannot name the domain of
//!   is a hash you cannot reason about, and undomained digests are how
//!   cross-context collisions sneak into signing schemes.
//! - **SHA-256** survives at exactly one seam: account-id derivation,
//!   where external tooling expects the truncated-SHA-256 convention.
//!
//! Domains ride on BLAKE3's `derive_key` mode, which gives each context
//! string its own internal IV. A ledger header and a proposal that
//! happen to serialize to the same bytes can never collide on hash.
//!
//! The Merkle tree here extends the same discipline downward: leaves and
//! interior nodes hash under *different* domains, so no crafted leaf can
//! impersonate an interior node (the classic second-preimage trick
//! against naive binary trees).

use sha2::{Digest, Sha256};

/// Hash domain for Merkle leaves.
const MERKLE_LEAF_DOMAIN: &str = "pulsar.merkle.leaf";

/// Hash domain for Merkle interior nodes.
const MERKLE_NODE_DOMAIN: &str = "pulsar.merkle.node";

/// A 256-bit content identifier.
///
/// Identifies ledgers, transaction sets, individual transactions, and
/// every other hashable object in the protocol. A plain byte array rather
/// than a newtype: `[u8; 32]` already gives us `Copy`, `Eq`, `Ord` (the
/// validation store's tie-break relies on the lexicographic order), serde,
/// and map keys without ceremony.
pub type Hash256 = [u8; 32];

/// A 160-bit account identifier, opaque to the consensus core.
pub type AccountId = [u8; 20];

/// Hash `data` under the named domain.
pub fn domain_hash(context: &str, data: &[u8]) -> Hash256 {
    domain_hash_parts(context, &[data])
}

/// Hash several byte slices under the named domain, as if concatenated.
///
/// The parts feed one hasher sequentially, so composite preimages like
/// `(parent_root || tx_root)` never need a temporary buffer. Part
/// boundaries are NOT encoded; callers that need them framed must frame
/// them (the signing digests do, with fixed-width fields).
pub fn domain_hash_parts(context: &str, parts: &[&[u8]]) -> Hash256 {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Derive a 160-bit account identifier from Ed25519 public-key bytes.
///
/// The first 20 bytes of SHA-256 of the key. The core treats the result as
/// opaque; the truncation convention exists for interoperability with
/// address tooling, not for any consensus rule.
pub fn account_id(public_key: &[u8; 32]) -> AccountId {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    let digest = hasher.finalize();
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest[..20]);
    id
}

/// Compute a binary Merkle root over a list of leaf hashes.
///
/// Construction:
///
/// 1. Every input is re-hashed under the leaf domain, so raw inputs never
///    appear as tree nodes.
/// 2. Each level pairs left-to-right; a pair hashes to
///    `H_node(left || right)` under the interior domain.
/// 3. An odd node at the end of a level is promoted unchanged. It is
///    already a domain-separated digest, so promotion cannot be confused
///    with anything a leaf could produce.
///
/// The result is order-sensitive (consensus requires everyone to agree
/// on leaf order, which the sorted transaction-set ids provide) and a
/// single leaf already yields a proper tree root distinct from the leaf
/// itself. An empty input returns all zeros, the "empty set" sentinel
/// that ledger headers use for transaction-free ledgers.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<Hash256> = leaves
        .iter()
        .map(|leaf| domain_hash(MERKLE_LEAF_DOMAIN, leaf))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut pairs = level.chunks_exact(2);
        for pair in &mut pairs {
            next.push(domain_hash_parts(
                MERKLE_NODE_DOMAIN,
                &[&pair[0], &pair[1]],
            ));
        }
        if let [odd] = pairs.remainder() {
            next.push(*odd);
        }
        level = next;
    }

    level[0]
}
