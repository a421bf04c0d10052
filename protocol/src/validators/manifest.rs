//! # Manifests
//!
//! A manifest binds a validator's long-term master key to a rotating
//! signing key. Operators keep the master key cold; the signing key lives
//! on the validator box and gets rotated by publishing a new manifest with
//! a higher sequence.
//!
//! Acceptance rules:
//!
//! - The signature must verify under the **master** key. The signing key
//!   asserts nothing; it is the thing being asserted.
//! - The sequence must strictly increase per master key. Replayed or
//!   reordered manifests are `Stale`.
//! - A manifest with `sequence == u32::MAX` is a revocation: the master
//!   key is burned and no future manifest from it can ever be accepted
//!   (nothing exceeds `u32::MAX`).

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{domain_hash, Hash256};
use crate::crypto::keys::{PulsarKeypair, PulsarPublicKey, PulsarSignature};

/// Hash domain for manifest signing digests.
const MANIFEST_SIGN_DOMAIN: &str = "pulsar.manifest";

/// The sequence value that revokes a master key.
pub const MANIFEST_REVOCATION_SEQ: u32 = u32::MAX;

/// Outcome of offering a manifest to the trusted-validator registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestDisposition {
    /// Applied: the master's signing key (or revocation) was updated.
    Accepted,
    /// Sequence not newer than what we already hold; ignored.
    Stale,
    /// Valid signature, but the master key is not on our UNL. Retained
    /// for gossip, ignored for trust.
    Untrusted,
    /// Bad signature or malformed; discarded.
    Invalid,
}

/// A signed master-to-signing-key binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Rotation counter. Strictly increasing per master key;
    /// `u32::MAX` revokes the master.
    pub sequence: u32,
    /// The validator's long-term identity.
    pub master_public_key: PulsarPublicKey,
    /// The key that will sign proposals and validations until the next
    /// rotation. Ignored in a revocation manifest.
    pub signing_public_key: PulsarPublicKey,
    /// Master-key signature over the signing digest.
    pub signature: PulsarSignature,
}

impl Manifest {
    /// Build and sign a rotation manifest with the master keypair.
    pub fn new(
        master: &PulsarKeypair,
        signing_public_key: PulsarPublicKey,
        sequence: u32,
    ) -> Self {
        let master_public_key = master.public_key();
        let digest = signing_digest(sequence, &master_public_key, &signing_public_key);
        let signature = master.sign(&digest);

        Self {
            sequence,
            master_public_key,
            signing_public_key,
            signature,
        }
    }

    /// Build a revocation manifest: burns the master key permanently.
    pub fn revocation(master: &PulsarKeypair) -> Self {
        // The signing key field is irrelevant in a revocation; we bind the
        // master key to itself so the field is at least well-formed.
        Self::new(master, master.public_key(), MANIFEST_REVOCATION_SEQ)
    }

    /// Verify the master-key signature.
    pub fn verify(&self) -> bool {
        let digest = signing_digest(
            self.sequence,
            &self.master_public_key,
            &self.signing_public_key,
        );
        self.master_public_key.verify(&digest, &self.signature)
    }

    /// Is this a revocation manifest?
    pub fn is_revocation(&self) -> bool {
        self.sequence == MANIFEST_REVOCATION_SEQ
    }
}

/// The digest a manifest signature covers.
fn signing_digest(
    sequence: u32,
    master: &PulsarPublicKey,
    signing: &PulsarPublicKey,
) -> Hash256 {
    let mut preimage = Vec::with_capacity(68);
    preimage.extend_from_slice(&sequence.to_le_bytes());
    preimage.extend_from_slice(master.as_bytes());
    preimage.extend_from_slice(signing.as_bytes());
    domain_hash(MANIFEST_SIGN_DOMAIN, &preimage)
}
