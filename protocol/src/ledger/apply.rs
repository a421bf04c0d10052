//! # The Applicator Seam
//!
//! Transaction validity is not consensus's problem. The round driver hands
//! an agreed transaction set to a [`TxApplicator`] and gets back the state
//! root of the resulting ledger; what "applying" means is entirely the
//! applicator's business.
//!
//! The trait has two halves:
//!
//! - **Closed-ledger application**: `apply(parent, tx_set)` is a pure,
//!   deterministic function of its inputs. Every honest validator applying
//!   the same set on the same parent must derive the same state root, or
//!   validations will never converge.
//! - **Open-ledger admission**: `open_ledger_add(tx)` accepts locally
//!   submitted transactions into the open set that the next proposal will
//!   snapshot. Admission results use a four-way enum in the tradition of
//!   transaction engine result codes.
//!
//! [`DeterministicApplicator`] is the reference implementation used by the
//! node binary and the tests. It derives state roots by hashing instead of
//! executing, which is exactly enough for the consensus core: the driver
//! never looks inside a state root, it only compares them.

use parking_lot::RwLock;
use thiserror::Error;

use crate::crypto::hash::{domain_hash, Hash256};
use crate::ledger::header::LedgerHeader;
use crate::ledger::tx_set::TxSet;

/// Hash domain for derived state roots.
const STATE_HASH_DOMAIN: &str = "pulsar.state";

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Result of admitting a locally submitted transaction to the open ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The transaction entered the open set and will be in our next
    /// proposal snapshot.
    Applied,
    /// Not applicable right now (e.g. sequence gap); retry next ledger.
    Queued,
    /// Permanently invalid; resubmitting the same bytes will never help.
    PermanentFail,
    /// Failed for a transient reason (e.g. open set at capacity); the
    /// submitter may retry.
    RetriableFail,
}

// ---------------------------------------------------------------------------
// Errors & Outcome
// ---------------------------------------------------------------------------

/// Errors surfaced by closed-ledger application.
///
/// Anything coming out of here is fatal to the round: an applicator that
/// cannot deterministically apply an agreed set leaves the driver nothing
/// to validate.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The applicator detected an internal inconsistency while building
    /// the new state.
    #[error("state integrity failure: {0}")]
    Integrity(String),
}

/// The outcome of applying an agreed transaction set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOutcome {
    /// State root of the new ledger.
    pub state_root: Hash256,
    /// Root of the applied transaction set (echoed for convenience).
    pub tx_set_root: Hash256,
    /// How many transactions were applied.
    pub applied: usize,
}

// ---------------------------------------------------------------------------
// TxApplicator
// ---------------------------------------------------------------------------

/// The seam between consensus and the transaction engine.
///
/// Implementations must be deterministic in `apply` and thread-safe:
/// the driver calls `apply` from its tick while the RPC intake calls
/// `open_ledger_add` concurrently.
pub trait TxApplicator: Send + Sync {
    /// Deterministically apply `tx_set` on top of `parent`, producing the
    /// new state root.
    fn apply(&self, parent: &LedgerHeader, tx_set: &TxSet) -> Result<AppliedOutcome, ApplyError>;

    /// Admit a locally submitted transaction into the open ledger.
    fn open_ledger_add(&self, tx: &[u8]) -> Admission;

    /// Snapshot the current open transaction set.
    fn open_snapshot(&self) -> TxSet;

    /// Drop every open transaction that appears in `applied`. Called after
    /// a round closes so included transactions don't get re-proposed.
    fn prune_open(&self, applied: &TxSet);
}

// ---------------------------------------------------------------------------
// DeterministicApplicator
// ---------------------------------------------------------------------------

/// Reference applicator: state roots derived by hashing, no execution.
///
/// `state_root' = H(parent.state_root || tx_set_root)` under its own hash
/// domain. Deterministic, collision-resistant, and blind to transaction
/// content, which is precisely the contract the consensus core depends on.
pub struct DeterministicApplicator {
    open: RwLock<TxSet>,
    /// Open-set capacity. Admission returns `RetriableFail` beyond this.
    max_open: usize,
}

impl DeterministicApplicator {
    /// Create an applicator with the default open-set capacity.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Create an applicator with an explicit open-set capacity.
    pub fn with_capacity(max_open: usize) -> Self {
        Self {
            open: RwLock::new(TxSet::new()),
            max_open,
        }
    }

    /// Number of transactions currently in the open set.
    pub fn open_len(&self) -> usize {
        self.open.read().len()
    }
}

impl Default for DeterministicApplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl TxApplicator for DeterministicApplicator {
    fn apply(&self, parent: &LedgerHeader, tx_set: &TxSet) -> Result<AppliedOutcome, ApplyError> {
        let tx_set_root = tx_set.root();

        let mut preimage = Vec::with_capacity(64);
        preimage.extend_from_slice(&parent.state_root);
        preimage.extend_from_slice(&tx_set_root);
        let state_root = domain_hash(STATE_HASH_DOMAIN, &preimage);

        Ok(AppliedOutcome {
            state_root,
            tx_set_root,
            applied: tx_set.len(),
        })
    }

    fn open_ledger_add(&self, tx: &[u8]) -> Admission {
        if tx.is_empty() {
            // An empty blob hashes fine but can never carry a transaction.
            return Admission::PermanentFail;
        }

        let mut open = self.open.write();
        if open.len() >= self.max_open {
            return Admission::RetriableFail;
        }
        open.insert(tx.to_vec());
        Admission::Applied
    }

    fn open_snapshot(&self) -> TxSet {
        self.open.read().clone()
    }

    fn prune_open(&self, applied: &TxSet) {
        let mut open = self.open.write();
        for (id, _) in applied.iter() {
            open.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::header::Ledger;

    #[test]
    fn apply_is_deterministic() {
        let applicator = DeterministicApplicator::new();
        let parent = Ledger::genesis();

        let mut set = TxSet::new();
        set.insert(vec![1, 2, 3]);

        let a = applicator.apply(&parent.header, &set).unwrap();
        let b = applicator.apply(&parent.header, &set).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.applied, 1);
    }

    #[test]
    fn apply_depends_on_parent_state() {
        let applicator = DeterministicApplicator::new();
        let genesis = Ledger::genesis();
        let child = Ledger::close(&genesis.header, [1u8; 32], vec![], [7u8; 32], 100, 30, 0);

        let set = TxSet::new();
        let on_genesis = applicator.apply(&genesis.header, &set).unwrap();
        let on_child = applicator.apply(&child.header, &set).unwrap();
        assert_ne!(on_genesis.state_root, on_child.state_root);
    }

    #[test]
    fn apply_depends_on_tx_set() {
        let applicator = DeterministicApplicator::new();
        let parent = Ledger::genesis();

        let empty = TxSet::new();
        let mut full = TxSet::new();
        full.insert(vec![9]);

        let a = applicator.apply(&parent.header, &empty).unwrap();
        let b = applicator.apply(&parent.header, &full).unwrap();
        assert_ne!(a.state_root, b.state_root);
    }

    #[test]
    fn admission_lifecycle() {
        let applicator = DeterministicApplicator::with_capacity(2);

        assert_eq!(applicator.open_ledger_add(&[1]), Admission::Applied);
        assert_eq!(applicator.open_ledger_add(&[2]), Admission::Applied);
        // At capacity: transient failure.
        assert_eq!(applicator.open_ledger_add(&[3]), Admission::RetriableFail);
        // Empty blob: permanent.
        assert_eq!(applicator.open_ledger_add(&[]), Admission::PermanentFail);
    }

    #[test]
    fn prune_removes_applied_transactions() {
        let applicator = DeterministicApplicator::new();
        applicator.open_ledger_add(&[1]);
        applicator.open_ledger_add(&[2]);

        let snapshot = applicator.open_snapshot();
        assert_eq!(snapshot.len(), 2);

        let mut applied = TxSet::new();
        applied.insert(vec![1]);
        applicator.prune_open(&applied);

        let after = applicator.open_snapshot();
        assert_eq!(after.len(), 1);
        assert!(after.contains(&TxSet::tx_id(&[2])));
    }
}
