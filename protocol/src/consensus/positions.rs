//! # Position Store
//!
//! Holds the proposals observed for the current round: one current
//! position per (validator, parent ledger), plus our own latest position
//! for rebroadcast.
//!
//! Two invariants, enforced at the ingest boundary:
//!
//! - For any (validator, parent), the stored proposal carries the highest
//!   `proposer_seq` seen. Older positions are superseded on arrival, in
//!   any arrival order.
//! - No stored proposal is older than the freshness window. A validator
//!   that stops talking stops counting.
//!
//! Ingest returns a [`ProposalDisposition`], never an error: a misbehaving
//! peer is a fact of life, not an exceptional condition.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{
    LEDGER_EARLY_INTERVAL_SECS, LEDGER_VAL_INTERVAL_SECS, PROPOSE_FRESHNESS_SECS,
};
use crate::consensus::clock::Clock;
use crate::consensus::proposal::Proposal;
use crate::crypto::hash::Hash256;
use crate::crypto::keys::PulsarPublicKey;
use crate::validators::unl::TrustedValidators;

/// Outcome of offering a peer proposal to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalDisposition {
    /// Stored as the current position for (validator, parent).
    Accepted,
    /// Close time outside the acceptance window; discarded without
    /// prejudice.
    Stale,
    /// An equal-or-newer position for (validator, parent) is already
    /// stored; the offered one is obsolete.
    Superseded,
    /// Signature verification failed, or the signing key does not
    /// resolve to a trusted validator; discarded with prejudice.
    Invalid,
}

/// A stored peer position plus its arrival time for freshness sweeps.
#[derive(Debug, Clone)]
struct StoredPosition {
    proposal: Proposal,
    arrived_ms: u64,
}

#[derive(Default)]
struct Inner {
    /// Current peer positions keyed by (validator, parent ledger hash).
    peers: HashMap<(PulsarPublicKey, Hash256), StoredPosition>,
    /// Our own latest position, kept for periodic rebroadcast.
    local: Option<Proposal>,
}

/// Thread-safe store of round positions.
///
/// Shared between the peer intake path and the round driver under a
/// single lock; every operation is a short critical section.
pub struct PositionStore {
    clock: Arc<dyn Clock>,
    unl: Arc<TrustedValidators>,
    inner: RwLock<Inner>,
}

impl PositionStore {
    /// Create an empty position store on the given clock and trust list.
    pub fn new(clock: Arc<dyn Clock>, unl: Arc<TrustedValidators>) -> Self {
        Self {
            clock,
            unl,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Offer a peer proposal.
    ///
    /// Accepted iff the signature verifies under a currently trusted
    /// signing key, the close time lies inside the acceptance window, and
    /// the position is strictly newer than anything stored for
    /// (validator, parent). A signature by a rotated-out or unknown key
    /// is `Invalid`: positions only count from identities we can hold
    /// accountable.
    pub fn insert_peer(&self, proposal: Proposal) -> ProposalDisposition {
        if !proposal.verify() {
            warn!(
                proposer = %proposal.public_key,
                "rejecting proposal with bad signature"
            );
            return ProposalDisposition::Invalid;
        }

        if !self.unl.is_trusted_signer(&proposal.public_key) {
            debug!(
                proposer = %proposal.public_key,
                "rejecting proposal from untrusted signing key"
            );
            return ProposalDisposition::Invalid;
        }

        let wall_now = self.clock.wall_secs();
        if !close_time_in_window(proposal.close_time, wall_now) {
            debug!(
                proposer = %proposal.public_key,
                close_time = proposal.close_time,
                wall_now,
                "discarding out-of-window proposal"
            );
            return ProposalDisposition::Stale;
        }

        let key = (proposal.public_key, proposal.parent_hash);
        let mut inner = self.inner.write();

        if let Some(existing) = inner.peers.get(&key) {
            if existing.proposal.proposer_seq >= proposal.proposer_seq {
                return ProposalDisposition::Superseded;
            }
        }

        inner.peers.insert(
            key,
            StoredPosition {
                proposal,
                arrived_ms: self.clock.monotonic_ms(),
            },
        );
        ProposalDisposition::Accepted
    }

    /// Snapshot the current positions at the given parent.
    pub fn current_proposals(&self, parent: &Hash256) -> Vec<Proposal> {
        self.inner
            .read()
            .peers
            .iter()
            .filter(|((_, p), _)| p == parent)
            .map(|(_, stored)| stored.proposal.clone())
            .collect()
    }

    /// Number of distinct validators currently proposing at the parent.
    pub fn proposer_count(&self, parent: &Hash256) -> usize {
        self.inner
            .read()
            .peers
            .keys()
            .filter(|(_, p)| p == parent)
            .count()
    }

    /// Drop positions older than the freshness window.
    pub fn sweep(&self) {
        let now_ms = self.clock.monotonic_ms();
        let cutoff = PROPOSE_FRESHNESS_SECS * 1_000;
        let mut inner = self.inner.write();
        let before = inner.peers.len();
        inner
            .peers
            .retain(|_, stored| now_ms.saturating_sub(stored.arrived_ms) <= cutoff);
        let dropped = before - inner.peers.len();
        if dropped > 0 {
            debug!(dropped, "swept stale proposals");
        }
    }

    /// Record our own latest position.
    pub fn set_local(&self, proposal: Proposal) {
        self.inner.write().local = Some(proposal);
    }

    /// Our latest position, if we have taken one this round.
    pub fn local(&self) -> Option<Proposal> {
        self.inner.read().local.clone()
    }

    /// Forget our local position when a round ends. Peer positions stay;
    /// anything aimed at an old parent ages out via the freshness sweep,
    /// and peers may legitimately have proposed on the new parent before
    /// we finished adopting it.
    pub fn clear_local(&self) {
        self.inner.write().local = None;
    }

    /// Forget everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.peers.clear();
        inner.local = None;
    }

    /// Total stored peer positions, across all parents.
    pub fn len(&self) -> usize {
        self.inner.read().peers.len()
    }

    /// True if no peer positions are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().peers.is_empty()
    }
}

/// The close-time acceptance window: a proposal may trail our wall clock
/// by the validation interval or lead it by the early interval.
fn close_time_in_window(close_time: u64, wall_now: u64) -> bool {
    close_time + LEDGER_VAL_INTERVAL_SECS >= wall_now
        && close_time <= wall_now + LEDGER_EARLY_INTERVAL_SECS
}
