//! # Ledger Module
//!
//! The closed-ledger data model: headers forming a hash-linked chain,
//! opaque transaction sets identified by Merkle root, and the applicator
//! seam through which agreed transaction sets become new ledger state.
//!
//! ## Architecture
//!
//! ```text
//! header.rs — LedgerHeader/Ledger, genesis, hash/verify operations
//! tx_set.rs — TxSet: unordered opaque transactions keyed by id hash
//! apply.rs  — TxApplicator trait + deterministic reference applicator
//! ```
//!
//! ## Design Decisions
//!
//! - Headers reference parents by hash, never by handle. Subsystems share
//!   live ledgers as `Arc<Ledger>`; keeping handles out of the data model
//!   makes reference cycles impossible.
//! - The consensus core treats transactions as opaque blobs. Validity
//!   semantics live behind [`TxApplicator`]; the core only needs set
//!   membership and deterministic application.

pub mod apply;
pub mod header;
pub mod tx_set;

pub use apply::{Admission, AppliedOutcome, ApplyError, DeterministicApplicator, TxApplicator};
pub use header::{Ledger, LedgerHeader, CLOSE_FLAG_NO_CONSENSUS_TIME};
pub use tx_set::TxSet;
