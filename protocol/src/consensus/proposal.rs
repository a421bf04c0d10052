//! # Proposals
//!
//! A proposal is a validator's signed position in one consensus round:
//! "on top of parent P, I want to close the ledger with transaction set S
//! at close time T". Each time a validator changes its position within a
//! round it bumps `proposer_seq`, so positions from one validator for one
//! parent are totally ordered and a newer position supersedes an older
//! one no matter the arrival order.
//!
//! The signature covers every field under a proposal-specific hash domain,
//! so a proposal can never be replayed as a validation or vice versa.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{domain_hash, Hash256};
use crate::crypto::keys::{PulsarKeypair, PulsarPublicKey, PulsarSignature};

/// Hash domain for proposal signing digests.
const PROPOSAL_SIGN_DOMAIN: &str = "pulsar.proposal";

/// A validator's signed position for one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Hash of the parent ledger this position builds on.
    pub parent_hash: Hash256,
    /// Merkle root of the proposed transaction set.
    pub tx_set_root: Hash256,
    /// Proposed close time, network seconds, rounded to the round's
    /// resolution by the proposer.
    pub close_time: u64,
    /// Position counter within the round. 0 is the initial position;
    /// larger supersedes smaller for the same (validator, parent).
    pub proposer_seq: u32,
    /// The proposing validator's signing key.
    pub public_key: PulsarPublicKey,
    /// Ed25519 signature over the signing digest.
    pub signature: PulsarSignature,
}

impl Proposal {
    /// Build and sign a proposal.
    pub fn new(
        keypair: &PulsarKeypair,
        parent_hash: Hash256,
        tx_set_root: Hash256,
        close_time: u64,
        proposer_seq: u32,
    ) -> Self {
        let digest = signing_digest(&parent_hash, &tx_set_root, close_time, proposer_seq);
        let signature = keypair.sign(&digest);

        Self {
            parent_hash,
            tx_set_root,
            close_time,
            proposer_seq,
            public_key: keypair.public_key(),
            signature,
        }
    }

    /// Verify this proposal's signature against its embedded public key.
    ///
    /// Whether that key belongs to anyone we trust is the UNL's question,
    /// not this one's.
    pub fn verify(&self) -> bool {
        let digest = signing_digest(
            &self.parent_hash,
            &self.tx_set_root,
            self.close_time,
            self.proposer_seq,
        );
        self.public_key.verify(&digest, &self.signature)
    }

    /// Is this the validator's opening position for the round?
    pub fn is_initial(&self) -> bool {
        self.proposer_seq == 0
    }
}

/// The digest a proposal signature covers: every field, domain-separated.
fn signing_digest(
    parent_hash: &Hash256,
    tx_set_root: &Hash256,
    close_time: u64,
    proposer_seq: u32,
) -> Hash256 {
    let mut preimage = Vec::with_capacity(76);
    preimage.extend_from_slice(parent_hash);
    preimage.extend_from_slice(tx_set_root);
    preimage.extend_from_slice(&close_time.to_le_bytes());
    preimage.extend_from_slice(&proposer_seq.to_le_bytes());
    domain_hash(PROPOSAL_SIGN_DOMAIN, &preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_proposal(seq: u32) -> (PulsarKeypair, Proposal) {
        let kp = PulsarKeypair::generate();
        let proposal = Proposal::new(&kp, [1u8; 32], [2u8; 32], 600, seq);
        (kp, proposal)
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (_, proposal) = make_proposal(0);
        assert!(proposal.verify());
        assert!(proposal.is_initial());
    }

    #[test]
    fn tampered_tx_set_fails() {
        let (_, mut proposal) = make_proposal(0);
        proposal.tx_set_root[0] ^= 0xFF;
        assert!(!proposal.verify());
    }

    #[test]
    fn tampered_close_time_fails() {
        let (_, mut proposal) = make_proposal(0);
        proposal.close_time += 1;
        assert!(!proposal.verify());
    }

    #[test]
    fn tampered_proposer_seq_fails() {
        // Replaying an old position with a bumped counter must not verify.
        let (_, mut proposal) = make_proposal(3);
        proposal.proposer_seq = 4;
        assert!(!proposal.verify());
    }

    #[test]
    fn substituted_key_fails() {
        let (_, mut proposal) = make_proposal(0);
        proposal.public_key = PulsarKeypair::generate().public_key();
        assert!(!proposal.verify());
    }

    #[test]
    fn serialization_roundtrip_is_bit_identical() {
        let (_, proposal) = make_proposal(2);
        let bytes = bincode::serialize(&proposal).expect("serialize");
        let recovered: Proposal = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(proposal, recovered);
        let again = bincode::serialize(&recovered).expect("serialize");
        assert_eq!(bytes, again);
    }
}
