//! # Validations
//!
//! A validation is a validator's signed assertion that a specific closed
//! ledger is fully valid. Validations are what make a ledger *the* ledger:
//! once a quorum of trusted validators validates the same hash at the same
//! sequence, that ledger is the network's last closed ledger and everything
//! built on any competitor is history.
//!
//! Validations optionally carry a fee vote and amendment votes. Both ride
//! along for the fee-voting and amendment machinery elsewhere; the quorum
//! arithmetic in the validation store looks only at (validator, seq, hash).

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{domain_hash, Hash256};
use crate::crypto::keys::{PulsarKeypair, PulsarPublicKey, PulsarSignature};

/// Hash domain for validation signing digests.
const VALIDATION_SIGN_DOMAIN: &str = "pulsar.validation";

/// Flag bit: the signer fully applied the ledger rather than merely
/// following the majority. Only full validations count toward quorum.
pub const VALIDATION_FLAG_FULL: u32 = 0x01;

/// A validator's advisory fee vote, carried inside a validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeVote {
    /// Proposed base transaction fee, in drops.
    pub base_fee: u64,
    /// Proposed account reserve, in drops.
    pub reserve_base: u64,
    /// Proposed per-object reserve increment, in drops.
    pub reserve_increment: u64,
}

/// A signed assertion that ledger (`ledger_hash`, `seq`) is fully valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Hash of the validated ledger.
    pub ledger_hash: Hash256,
    /// Sequence of the validated ledger.
    pub seq: u32,
    /// When the validator signed, network seconds. Drives the currency
    /// window in the validation store.
    pub sign_time: u64,
    /// Flag bits (see [`VALIDATION_FLAG_FULL`]).
    pub flags: u32,
    /// The validating validator's signing key.
    pub public_key: PulsarPublicKey,
    /// Ed25519 signature over the signing digest.
    pub signature: PulsarSignature,
    /// Advisory fee vote; orthogonal to quorum counting.
    pub fee_vote: Option<FeeVote>,
    /// Amendments this validator is voting for; orthogonal to quorum.
    pub amendments: Vec<Hash256>,
}

impl Validation {
    /// Build and sign a full validation with no fee or amendment votes.
    pub fn full(
        keypair: &PulsarKeypair,
        ledger_hash: Hash256,
        seq: u32,
        sign_time: u64,
    ) -> Self {
        Self::new(
            keypair,
            ledger_hash,
            seq,
            sign_time,
            VALIDATION_FLAG_FULL,
            None,
            Vec::new(),
        )
    }

    /// Build and sign a validation with explicit flags and votes.
    pub fn new(
        keypair: &PulsarKeypair,
        ledger_hash: Hash256,
        seq: u32,
        sign_time: u64,
        flags: u32,
        fee_vote: Option<FeeVote>,
        amendments: Vec<Hash256>,
    ) -> Self {
        let digest = signing_digest(&ledger_hash, seq, sign_time, flags, &fee_vote, &amendments);
        let signature = keypair.sign(&digest);

        Self {
            ledger_hash,
            seq,
            sign_time,
            flags,
            public_key: keypair.public_key(),
            signature,
            fee_vote,
            amendments,
        }
    }

    /// Verify this validation's signature against its embedded public key.
    pub fn verify(&self) -> bool {
        let digest = signing_digest(
            &self.ledger_hash,
            self.seq,
            self.sign_time,
            self.flags,
            &self.fee_vote,
            &self.amendments,
        );
        self.public_key.verify(&digest, &self.signature)
    }

    /// Did the signer fully apply the ledger?
    pub fn is_full(&self) -> bool {
        self.flags & VALIDATION_FLAG_FULL != 0
    }
}

/// The digest a validation signature covers. The fee vote and amendment
/// list are inside the signature: advisory to quorum, but not forgeable.
fn signing_digest(
    ledger_hash: &Hash256,
    seq: u32,
    sign_time: u64,
    flags: u32,
    fee_vote: &Option<FeeVote>,
    amendments: &[Hash256],
) -> Hash256 {
    let mut preimage = Vec::with_capacity(96 + amendments.len() * 32);
    preimage.extend_from_slice(ledger_hash);
    preimage.extend_from_slice(&seq.to_le_bytes());
    preimage.extend_from_slice(&sign_time.to_le_bytes());
    preimage.extend_from_slice(&flags.to_le_bytes());
    match fee_vote {
        Some(vote) => {
            preimage.push(1);
            preimage.extend_from_slice(&vote.base_fee.to_le_bytes());
            preimage.extend_from_slice(&vote.reserve_base.to_le_bytes());
            preimage.extend_from_slice(&vote.reserve_increment.to_le_bytes());
        }
        None => preimage.push(0),
    }
    for amendment in amendments {
        preimage.extend_from_slice(amendment);
    }
    domain_hash(VALIDATION_SIGN_DOMAIN, &preimage)
}
