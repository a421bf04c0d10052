//! # The Unique Node List
//!
//! The set of validator master keys this node trusts for quorum. Only
//! validators on this list contribute weight to validation quorums;
//! everyone else's validations are stored, gossiped, and politely ignored.
//!
//! The list is mutated from two directions: operator configuration adds
//! and removes master keys, and manifests rotate the signing key a master
//! is currently using. Reads vastly outnumber writes (every proposal and
//! validation ingest resolves a signing key), so the whole thing sits
//! behind a read-mostly lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::MIN_CONSENSUS_PCT;
use crate::crypto::keys::PulsarPublicKey;
use crate::validators::manifest::{Manifest, ManifestDisposition};

/// One trusted validator's entry.
#[derive(Debug, Clone)]
struct ValidatorEntry {
    /// Operator-facing label, for logs and status output.
    label: String,
    /// The signing key currently bound by manifest. Starts equal to the
    /// master key until the first manifest arrives. `None` once revoked.
    signing_key: Option<PulsarPublicKey>,
    /// Highest manifest sequence applied for this master.
    manifest_seq: u32,
}

#[derive(Default)]
struct Inner {
    /// Trusted validators keyed by master public key.
    trusted: HashMap<PulsarPublicKey, ValidatorEntry>,
    /// Reverse index: signing key to master key, for ingest-path lookups.
    by_signer: HashMap<PulsarPublicKey, PulsarPublicKey>,
    /// Highest manifest sequence seen per untrusted master, so gossiped
    /// manifests can be deduplicated without trusting anyone.
    untrusted_seqs: HashMap<PulsarPublicKey, u32>,
}

/// The trusted validator registry (UNL) and manifest cache.
pub struct TrustedValidators {
    inner: RwLock<Inner>,
}

impl TrustedValidators {
    /// Create an empty list. A node with an empty UNL can watch the
    /// network but will never see a quorum.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Convenience: a shared, empty list.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Trust a master key. Until a manifest arrives, the master key is
    /// assumed to sign directly.
    pub fn add(&self, master: PulsarPublicKey, label: impl Into<String>) {
        let label = label.into();
        let mut inner = self.inner.write();
        inner.by_signer.insert(master, master);
        inner.trusted.insert(
            master,
            ValidatorEntry {
                label: label.clone(),
                signing_key: Some(master),
                manifest_seq: 0,
            },
        );
        info!(master = %master, label, "validator added to UNL");
    }

    /// Stop trusting a master key.
    pub fn remove(&self, master: &PulsarPublicKey) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.trusted.remove(master) {
            if let Some(signer) = entry.signing_key {
                inner.by_signer.remove(&signer);
            }
            info!(master = %master, label = entry.label, "validator removed from UNL");
        }
    }

    /// Apply a manifest, rotating (or revoking) a master's signing key.
    pub fn apply_manifest(&self, manifest: &Manifest) -> ManifestDisposition {
        if !manifest.verify() {
            warn!(master = %manifest.master_public_key, "rejecting manifest with bad signature");
            return ManifestDisposition::Invalid;
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let Some(entry) = inner.trusted.get(&manifest.master_public_key) else {
            // Not ours to trust, but remember the sequence for gossip dedup.
            let seen = inner
                .untrusted_seqs
                .entry(manifest.master_public_key)
                .or_insert(0);
            if manifest.sequence <= *seen {
                return ManifestDisposition::Stale;
            }
            *seen = manifest.sequence;
            return ManifestDisposition::Untrusted;
        };

        // manifest_seq 0 means "no manifest applied yet"; a first manifest
        // must still carry sequence >= 1.
        if entry.manifest_seq != 0 && manifest.sequence <= entry.manifest_seq {
            return ManifestDisposition::Stale;
        }
        if manifest.sequence == 0 {
            return ManifestDisposition::Stale;
        }

        let old_signer = entry.signing_key;
        let master = manifest.master_public_key;

        if manifest.is_revocation() {
            warn!(master = %master, "master key revoked by manifest");
            if let Some(signer) = old_signer {
                inner.by_signer.remove(&signer);
            }
            let entry = inner.trusted.get_mut(&master).expect("checked above");
            entry.signing_key = None;
            entry.manifest_seq = manifest.sequence;
            return ManifestDisposition::Accepted;
        }

        info!(
            master = %master,
            signer = %manifest.signing_public_key,
            sequence = manifest.sequence,
            "validator signing key rotated"
        );
        if let Some(signer) = old_signer {
            inner.by_signer.remove(&signer);
        }
        inner.by_signer.insert(manifest.signing_public_key, master);
        let entry = inner.trusted.get_mut(&master).expect("checked above");
        entry.signing_key = Some(manifest.signing_public_key);
        entry.manifest_seq = manifest.sequence;
        ManifestDisposition::Accepted
    }

    /// Resolve a signing key to the trusted master it currently signs for.
    ///
    /// Returns `None` for unknown signers, revoked masters, and keys that
    /// were rotated out. This is THE trust query: a signature only counts
    /// if this resolves.
    pub fn master_for_signer(&self, signer: &PulsarPublicKey) -> Option<PulsarPublicKey> {
        self.inner.read().by_signer.get(signer).copied()
    }

    /// Is this signing key currently trusted?
    pub fn is_trusted_signer(&self, signer: &PulsarPublicKey) -> bool {
        self.master_for_signer(signer).is_some()
    }

    /// Is this master key on the list (revoked or not)?
    pub fn is_listed_master(&self, master: &PulsarPublicKey) -> bool {
        self.inner.read().trusted.contains_key(master)
    }

    /// Number of trusted masters (including revoked ones, which still
    /// occupy a list slot until the operator removes them).
    pub fn len(&self) -> usize {
        self.inner.read().trusted.len()
    }

    /// True if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().trusted.is_empty()
    }

    /// The validation quorum: the minimum trust-weighted count of
    /// concurring validations needed to accept a ledger as validated.
    /// Ceiling of 80% of the list size.
    pub fn quorum(&self) -> u32 {
        let n = self.len() as u32;
        (n * MIN_CONSENSUS_PCT).div_ceil(100)
    }

    /// Labels and signing state, for status output.
    pub fn entries(&self) -> Vec<(PulsarPublicKey, String, Option<PulsarPublicKey>)> {
        self.inner
            .read()
            .trusted
            .iter()
            .map(|(master, e)| (*master, e.label.clone(), e.signing_key))
            .collect()
    }
}

impl Default for TrustedValidators {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::PulsarKeypair;

    #[test]
    fn quorum_is_eighty_percent_ceiling() {
        let unl = TrustedValidators::new();
        assert_eq!(unl.quorum(), 0);

        let keys: Vec<PulsarKeypair> = (0..5).map(|_| PulsarKeypair::generate()).collect();
        for (i, kp) in keys.iter().enumerate() {
            unl.add(kp.public_key(), format!("validator-{i}"));
        }
        // ceil(0.8 * 5) = 4
        assert_eq!(unl.quorum(), 4);

        unl.remove(&keys[4].public_key());
        // ceil(0.8 * 4) = 4: with four validators, everyone must agree.
        assert_eq!(unl.quorum(), 4);
    }

    #[test]
    fn master_signs_directly_until_first_manifest() {
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        unl.add(master.public_key(), "solo");

        assert!(unl.is_trusted_signer(&master.public_key()));
        assert_eq!(
            unl.master_for_signer(&master.public_key()),
            Some(master.public_key())
        );
    }

    #[test]
    fn manifest_rotates_signing_key() {
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        let signing = PulsarKeypair::generate();
        unl.add(master.public_key(), "rotator");

        let manifest = Manifest::new(&master, signing.public_key(), 1);
        assert_eq!(unl.apply_manifest(&manifest), ManifestDisposition::Accepted);

        // The new key resolves to the master; the master key no longer
        // signs directly.
        assert_eq!(
            unl.master_for_signer(&signing.public_key()),
            Some(master.public_key())
        );
        assert!(!unl.is_trusted_signer(&master.public_key()));
    }

    #[test]
    fn stale_sequence_rejected() {
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        let s1 = PulsarKeypair::generate();
        let s2 = PulsarKeypair::generate();
        unl.add(master.public_key(), "rotator");

        assert_eq!(
            unl.apply_manifest(&Manifest::new(&master, s1.public_key(), 2)),
            ManifestDisposition::Accepted
        );
        // Sequence 2 again: stale. Sequence 1: also stale.
        assert_eq!(
            unl.apply_manifest(&Manifest::new(&master, s2.public_key(), 2)),
            ManifestDisposition::Stale
        );
        assert_eq!(
            unl.apply_manifest(&Manifest::new(&master, s2.public_key(), 1)),
            ManifestDisposition::Stale
        );

        // s1 remains the active signer.
        assert!(unl.is_trusted_signer(&s1.public_key()));
        assert!(!unl.is_trusted_signer(&s2.public_key()));
    }

    #[test]
    fn sequence_zero_never_applies() {
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        let signing = PulsarKeypair::generate();
        unl.add(master.public_key(), "zero");

        assert_eq!(
            unl.apply_manifest(&Manifest::new(&master, signing.public_key(), 0)),
            ManifestDisposition::Stale
        );
    }

    #[test]
    fn unknown_master_is_untrusted() {
        let unl = TrustedValidators::new();
        let stranger = PulsarKeypair::generate();
        let signing = PulsarKeypair::generate();

        let manifest = Manifest::new(&stranger, signing.public_key(), 1);
        assert_eq!(
            unl.apply_manifest(&manifest),
            ManifestDisposition::Untrusted
        );
        // Replay of the same untrusted manifest is stale, not untrusted.
        assert_eq!(unl.apply_manifest(&manifest), ManifestDisposition::Stale);
        assert!(!unl.is_trusted_signer(&signing.public_key()));
    }

    #[test]
    fn bad_signature_is_invalid() {
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        let signing = PulsarKeypair::generate();
        unl.add(master.public_key(), "victim");

        let mut manifest = Manifest::new(&master, signing.public_key(), 1);
        manifest.sequence = 2;
        assert_eq!(unl.apply_manifest(&manifest), ManifestDisposition::Invalid);
    }

    #[test]
    fn revocation_burns_the_master() {
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        let signing = PulsarKeypair::generate();
        unl.add(master.public_key(), "burned");

        unl.apply_manifest(&Manifest::new(&master, signing.public_key(), 1));
        assert_eq!(
            unl.apply_manifest(&Manifest::revocation(&master)),
            ManifestDisposition::Accepted
        );

        // Neither the old signing key nor the master signs anymore, and no
        // later manifest can resurrect the key (nothing exceeds u32::MAX).
        assert!(!unl.is_trusted_signer(&signing.public_key()));
        assert!(!unl.is_trusted_signer(&master.public_key()));
        let late = PulsarKeypair::generate();
        assert_eq!(
            unl.apply_manifest(&Manifest::new(&master, late.public_key(), 5)),
            ManifestDisposition::Stale
        );
    }

    #[test]
    fn rotation_chain_old_keys_stop_resolving() {
        // After rotating to a new signing key, material signed by the old
        // key must no longer be attributable.
        let unl = TrustedValidators::new();
        let master = PulsarKeypair::generate();
        let old = PulsarKeypair::generate();
        let new = PulsarKeypair::generate();
        unl.add(master.public_key(), "chain");

        unl.apply_manifest(&Manifest::new(&master, old.public_key(), 1));
        assert!(unl.is_trusted_signer(&old.public_key()));

        unl.apply_manifest(&Manifest::new(&master, new.public_key(), 2));
        assert!(!unl.is_trusted_signer(&old.public_key()));
        assert!(unl.is_trusted_signer(&new.public_key()));
    }
}
