//! # Validation Store
//!
//! Observed validations, keyed by (validator, ledger sequence), with the
//! trust-weighted quorum queries that decide what the network's last
//! closed ledger actually is.
//!
//! Three populations live here:
//!
//! - **Current trusted validations** are the ones that count: signed by a
//!   key the UNL resolves, full (not partial), inside the currency window,
//!   and not from an equivocator. `trusted_for` and
//!   `best_validated_ledger` see only these.
//! - **Untrusted validations** are stored for gossip and ancestry but
//!   never weighed.
//! - **Expired validations** stay queryable for ancestry until they fall
//!   a retention depth behind the chain head, then sweep reclaims them.
//!
//! Equivocation (two different hashes from one validator at one sequence)
//! is recorded, not punished: the offender's weight at that sequence drops
//! to zero, and the operator gets a log line. Removing validators from the
//! UNL is a human decision.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{
    LEDGER_EARLY_INTERVAL_SECS, LEDGER_VAL_INTERVAL_SECS, VALIDATION_RETENTION_SEQS,
};
use crate::consensus::clock::Clock;
use crate::consensus::validation::Validation;
use crate::crypto::hash::Hash256;
use crate::crypto::keys::PulsarPublicKey;
use crate::validators::unl::TrustedValidators;

/// Outcome of offering a validation to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationDisposition {
    /// Stored. Counts toward quorum if trusted, full, and in-window.
    Current,
    /// Out of the currency window, or a duplicate of what we hold.
    Stale,
    /// The validator already validated a *different* ledger at this
    /// sequence. Recorded as equivocation; weight at this sequence is
    /// forfeit.
    Conflict,
    /// Signature verification failed.
    Invalid,
}

#[derive(Default)]
struct Inner {
    /// Trusted validations keyed by sequence, then master key.
    trusted: BTreeMap<u32, HashMap<PulsarPublicKey, Validation>>,
    /// Untrusted validations keyed by sequence, then signing key.
    untrusted: BTreeMap<u32, HashMap<PulsarPublicKey, Validation>>,
    /// (master, seq) pairs caught signing two hashes at one sequence.
    equivocators: HashSet<(PulsarPublicKey, u32)>,
    /// Highest sequence seen, trusted or not. Anchors retention.
    highest_seq: u32,
}

/// Thread-safe store of observed validations with quorum queries.
pub struct ValidationStore {
    clock: Arc<dyn Clock>,
    unl: Arc<TrustedValidators>,
    inner: RwLock<Inner>,
}

impl ValidationStore {
    /// Create an empty store bound to a clock and a UNL.
    pub fn new(clock: Arc<dyn Clock>, unl: Arc<TrustedValidators>) -> Self {
        Self {
            clock,
            unl,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Offer a validation.
    pub fn insert(&self, validation: Validation) -> ValidationDisposition {
        if !validation.verify() {
            warn!(
                signer = %validation.public_key,
                seq = validation.seq,
                "rejecting validation with bad signature"
            );
            return ValidationDisposition::Invalid;
        }

        let wall_now = self.clock.wall_secs();
        if !sign_time_in_window(validation.sign_time, wall_now) {
            debug!(
                signer = %validation.public_key,
                sign_time = validation.sign_time,
                wall_now,
                "discarding out-of-window validation"
            );
            return ValidationDisposition::Stale;
        }

        let seq = validation.seq;
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.highest_seq = inner.highest_seq.max(seq);

        let Some(master) = self.unl.master_for_signer(&validation.public_key) else {
            // Valid but nobody we trust. Keep it for gossip and ancestry.
            let slot = inner.untrusted.entry(seq).or_default();
            return match slot.get(&validation.public_key) {
                Some(existing) if existing.ledger_hash == validation.ledger_hash => {
                    ValidationDisposition::Stale
                }
                _ => {
                    slot.insert(validation.public_key, validation);
                    ValidationDisposition::Current
                }
            };
        };

        let slot = inner.trusted.entry(seq).or_default();
        if let Some(existing) = slot.get(&master) {
            if existing.ledger_hash == validation.ledger_hash {
                return ValidationDisposition::Stale;
            }
            // Same validator, same sequence, different ledger. That is the
            // one thing an honest validator can never do.
            warn!(
                master = %master,
                seq,
                first = %hex::encode(existing.ledger_hash),
                second = %hex::encode(validation.ledger_hash),
                "validator equivocated"
            );
            inner.equivocators.insert((master, seq));
            return ValidationDisposition::Conflict;
        }

        slot.insert(master, validation);
        ValidationDisposition::Current
    }

    /// Trust-weighted counts per candidate ledger hash at a sequence.
    ///
    /// Counts unique trusted masters whose current, full validation names
    /// each hash. Equivocators contribute nothing.
    pub fn trusted_for(&self, seq: u32) -> HashMap<Hash256, u32> {
        let wall_now = self.clock.wall_secs();
        let inner = self.inner.read();
        let mut weights: HashMap<Hash256, u32> = HashMap::new();

        if let Some(slot) = inner.trusted.get(&seq) {
            for (master, validation) in slot {
                if inner.equivocators.contains(&(*master, seq)) {
                    continue;
                }
                if !validation.is_full() {
                    continue;
                }
                if !sign_time_in_window(validation.sign_time, wall_now) {
                    continue;
                }
                if !self.unl.is_listed_master(master) {
                    continue;
                }
                *weights.entry(validation.ledger_hash).or_insert(0) += 1;
            }
        }

        weights
    }

    /// Number of distinct trusted validators with a current validation at
    /// this sequence, regardless of which hash they named. This is the
    /// "the network is finishing without us" signal.
    pub fn trusted_validating_at(&self, seq: u32) -> usize {
        self.trusted_for(seq).values().map(|w| *w as usize).sum()
    }

    /// The best fully-validated ledger: the hash with maximum trust weight
    /// at the highest sequence where any hash reaches quorum.
    ///
    /// Equal weights at the same sequence break toward the
    /// lexicographically smaller hash. (Protocol clarification: the
    /// tie-break is not formally documented upstream, but this is the
    /// observed behavior and every node must break ties identically.)
    pub fn best_validated_ledger(&self) -> Option<(Hash256, u32)> {
        let quorum = self.unl.quorum();
        if quorum == 0 {
            return None;
        }

        let seqs: Vec<u32> = {
            let inner = self.inner.read();
            inner.trusted.keys().rev().copied().collect()
        };

        for seq in seqs {
            let weights = self.trusted_for(seq);
            let best = weights
                .into_iter()
                .filter(|(_, w)| *w >= quorum)
                .min_by(|(hash_a, w_a), (hash_b, w_b)| {
                    // Highest weight first; smaller hash wins a tie.
                    w_b.cmp(w_a).then(hash_a.cmp(hash_b))
                });
            if let Some((hash, _)) = best {
                return Some((hash, seq));
            }
        }

        None
    }

    /// All stored trusted validations at a sequence, current or expired.
    /// Ancestry queries use this; quorum math never does.
    pub fn at_seq(&self, seq: u32) -> Vec<Validation> {
        self.inner
            .read()
            .trusted
            .get(&seq)
            .map(|slot| slot.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop validations that have fallen a retention depth behind the
    /// highest sequence seen. Window expiry is handled at query time;
    /// sweep is purely about memory.
    pub fn sweep(&self) {
        let mut inner = self.inner.write();
        let cutoff = inner.highest_seq.saturating_sub(VALIDATION_RETENTION_SEQS);
        if cutoff == 0 {
            return;
        }
        inner.trusted.retain(|seq, _| *seq >= cutoff);
        inner.untrusted.retain(|seq, _| *seq >= cutoff);
        inner.equivocators.retain(|(_, seq)| *seq >= cutoff);
        debug!(cutoff, "swept validations below retention depth");
    }

    /// Highest sequence any validation has named.
    pub fn highest_seq(&self) -> u32 {
        self.inner.read().highest_seq
    }
}

/// The currency window: a validation is current while our wall clock is
/// within `[sign_time - EARLY, sign_time + VAL_INTERVAL]`.
fn sign_time_in_window(sign_time: u64, wall_now: u64) -> bool {
    wall_now + LEDGER_EARLY_INTERVAL_SECS >= sign_time
        && wall_now <= sign_time + LEDGER_VAL_INTERVAL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::clock::ManualClock;
    use crate::crypto::keys::PulsarKeypair;

    struct Harness {
        clock: Arc<ManualClock>,
        unl: Arc<TrustedValidators>,
        store: ValidationStore,
        validators: Vec<PulsarKeypair>,
    }

    /// A store with `n` trusted validators.
    fn setup(n: usize) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let unl = TrustedValidators::shared();
        let validators: Vec<PulsarKeypair> = (0..n).map(|_| PulsarKeypair::generate()).collect();
        for (i, kp) in validators.iter().enumerate() {
            unl.add(kp.public_key(), format!("validator-{i}"));
        }
        let store = ValidationStore::new(clock.clone(), unl.clone());
        Harness {
            clock,
            unl,
            store,
            validators,
        }
    }

    fn validate(h: &Harness, v: usize, hash: Hash256, seq: u32) -> ValidationDisposition {
        let val = Validation::full(&h.validators[v], hash, seq, h.clock.wall_secs());
        h.store.insert(val)
    }

    #[test]
    fn current_validation_counts() {
        let h = setup(4);
        assert_eq!(validate(&h, 0, [1u8; 32], 5), ValidationDisposition::Current);

        let weights = h.store.trusted_for(5);
        assert_eq!(weights.get(&[1u8; 32]), Some(&1));
    }

    #[test]
    fn duplicate_is_stale() {
        let h = setup(4);
        validate(&h, 0, [1u8; 32], 5);
        assert_eq!(validate(&h, 0, [1u8; 32], 5), ValidationDisposition::Stale);
        assert_eq!(h.store.trusted_for(5).get(&[1u8; 32]), Some(&1));
    }

    #[test]
    fn bad_signature_is_invalid() {
        let h = setup(1);
        let mut val = Validation::full(&h.validators[0], [1u8; 32], 5, h.clock.wall_secs());
        val.seq = 6;
        assert_eq!(h.store.insert(val), ValidationDisposition::Invalid);
    }

    #[test]
    fn out_of_window_is_stale() {
        let h = setup(1);
        let old = Validation::full(
            &h.validators[0],
            [1u8; 32],
            5,
            h.clock.wall_secs() - LEDGER_VAL_INTERVAL_SECS - 1,
        );
        assert_eq!(h.store.insert(old), ValidationDisposition::Stale);

        let future = Validation::full(
            &h.validators[0],
            [1u8; 32],
            5,
            h.clock.wall_secs() + LEDGER_EARLY_INTERVAL_SECS + 1,
        );
        assert_eq!(h.store.insert(future), ValidationDisposition::Stale);
    }

    #[test]
    fn equivocation_recorded_and_weight_zeroed() {
        // One validator, two hashes, one sequence: first accepted, second
        // is a conflict, and the validator stops counting at that height.
        let h = setup(4);
        assert_eq!(validate(&h, 0, [1u8; 32], 5), ValidationDisposition::Current);
        assert_eq!(
            validate(&h, 0, [2u8; 32], 5),
            ValidationDisposition::Conflict
        );

        let weights = h.store.trusted_for(5);
        assert_eq!(weights.get(&[1u8; 32]), None);
        assert_eq!(weights.get(&[2u8; 32]), None);

        // Other validators at the same height are unaffected.
        validate(&h, 1, [1u8; 32], 5);
        assert_eq!(h.store.trusted_for(5).get(&[1u8; 32]), Some(&1));

        // And the equivocator still counts at other heights.
        assert_eq!(validate(&h, 0, [3u8; 32], 6), ValidationDisposition::Current);
        assert_eq!(h.store.trusted_for(6).get(&[3u8; 32]), Some(&1));
    }

    #[test]
    fn untrusted_stored_but_not_weighed() {
        let h = setup(2);
        let stranger = PulsarKeypair::generate();
        let val = Validation::full(&stranger, [1u8; 32], 5, h.clock.wall_secs());

        assert_eq!(h.store.insert(val), ValidationDisposition::Current);
        assert!(h.store.trusted_for(5).is_empty());
    }

    #[test]
    fn partial_validation_not_weighed() {
        let h = setup(2);
        let val = Validation::new(
            &h.validators[0],
            [1u8; 32],
            5,
            h.clock.wall_secs(),
            0, // not full
            None,
            vec![],
        );
        assert_eq!(h.store.insert(val), ValidationDisposition::Current);
        assert!(h.store.trusted_for(5).is_empty());
    }

    #[test]
    fn expiry_removes_weight_at_query_time() {
        let h = setup(2);
        validate(&h, 0, [1u8; 32], 5);
        assert_eq!(h.store.trusted_for(5).get(&[1u8; 32]), Some(&1));

        // Push the wall clock past the currency window.
        h.clock.advance_secs(LEDGER_VAL_INTERVAL_SECS + 1);
        assert!(h.store.trusted_for(5).is_empty());

        // Still queryable for ancestry.
        assert_eq!(h.store.at_seq(5).len(), 1);
    }

    #[test]
    fn best_validated_ledger_reaches_quorum() {
        let h = setup(5); // quorum = 4
        for v in 0..4 {
            validate(&h, v, [7u8; 32], 10);
        }
        assert_eq!(h.store.best_validated_ledger(), Some(([7u8; 32], 10)));
    }

    #[test]
    fn below_quorum_is_no_ledger() {
        let h = setup(5); // quorum = 4
        for v in 0..3 {
            validate(&h, v, [7u8; 32], 10);
        }
        assert_eq!(h.store.best_validated_ledger(), None);
    }

    #[test]
    fn best_validated_prefers_highest_seq() {
        let h = setup(5); // quorum = 4
        for v in 0..4 {
            validate(&h, v, [7u8; 32], 10);
        }
        for v in 0..4 {
            validate(&h, v, [8u8; 32], 11);
        }
        assert_eq!(h.store.best_validated_ledger(), Some(([8u8; 32], 11)));
    }

    #[test]
    fn split_vote_below_quorum_is_no_ledger() {
        let h = setup(10); // quorum = 8
        for v in 0..5 {
            validate(&h, v, [0xCCu8; 32], 10);
        }
        for v in 5..10 {
            validate(&h, v, [0xAAu8; 32], 10);
        }
        // A 5 + 5 split of 10 never reaches quorum; nobody wins.
        assert_eq!(h.store.best_validated_ledger(), None);
    }

    #[test]
    fn quorum_winner_beats_lighter_competitor_at_same_seq() {
        // Quorum for one hash plus stragglers on another: the quorum hash
        // wins even though it is lexicographically larger. Weight decides
        // first; the lexicographic rule only splits exact ties.
        let h = setup(10); // quorum = 8
        for v in 0..8 {
            validate(&h, v, [0xCCu8; 32], 10);
        }
        for v in 8..10 {
            validate(&h, v, [0xAAu8; 32], 10);
        }
        assert_eq!(h.store.best_validated_ledger(), Some(([0xCCu8; 32], 10)));
    }

    #[test]
    fn trusted_validating_at_counts_all_hashes() {
        let h = setup(4);
        validate(&h, 0, [1u8; 32], 5);
        validate(&h, 1, [2u8; 32], 5);
        assert_eq!(h.store.trusted_validating_at(5), 2);
    }

    #[test]
    fn sweep_respects_retention_depth() {
        let h = setup(2);
        validate(&h, 0, [1u8; 32], 1);
        // A much later validation drags the retention cutoff past seq 1.
        validate(&h, 1, [2u8; 32], VALIDATION_RETENTION_SEQS + 10);

        h.store.sweep();
        assert!(h.store.at_seq(1).is_empty());
        assert_eq!(h.store.at_seq(VALIDATION_RETENTION_SEQS + 10).len(), 1);
    }

    #[test]
    fn removed_validator_stops_counting() {
        let h = setup(2);
        validate(&h, 0, [1u8; 32], 5);
        assert_eq!(h.store.trusted_for(5).get(&[1u8; 32]), Some(&1));

        h.unl.remove(&h.validators[0].public_key());
        assert!(h.store.trusted_for(5).is_empty());
    }
}
