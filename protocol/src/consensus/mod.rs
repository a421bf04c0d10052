//! # Consensus Module
//!
//! The consensus engine: the round driver and everything it consults to
//! agree, round by round, on the next closed ledger.
//!
//! ## Architecture
//!
//! ```text
//! clock.rs       — monotonic + wall time behind one injectable trait
//! timing.rs      — pure timing rules (close trigger, avalanche, resolution)
//! proposal.rs    — signed round positions
//! validation.rs  — signed full-validity assertions
//! positions.rs   — current peer positions for the round
//! validations.rs — observed validations + trust-weighted quorum queries
//! driver.rs      — the Open/Establish/Accepted/Processing state machine
//! ```
//!
//! ## Design Decisions
//!
//! - The driver is the only component that advances state, and it does so
//!   one tick at a time. Peer ingest writes to the stores and returns a
//!   disposition; the driver re-reads the stores on its own schedule.
//!   Nothing in this module calls back into anything above it.
//! - The timing rules are free functions with no clock and no stores, so
//!   the entire timing policy of the network is unit-testable in
//!   microseconds.
//! - Both stores take their clock and trust list as `Arc`s at
//!   construction. No global state, no ambient time.

pub mod clock;
pub mod driver;
pub mod positions;
pub mod proposal;
pub mod timing;
pub mod validation;
pub mod validations;

pub use clock::{Clock, ManualClock, WallClock};
pub use driver::{
    ConsensusEvent, CoreContext, DriverConfig, DriverError, RoundDriver, RoundPhase, TxSetCache,
};
pub use positions::{PositionStore, ProposalDisposition};
pub use proposal::Proposal;
pub use timing::{
    avalanche_threshold, check_consensus, effective_close_time, next_time_resolution,
    round_close_time, should_close_ledger, ConsensusOutcome,
};
pub use validation::{FeeVote, Validation, VALIDATION_FLAG_FULL};
pub use validations::{ValidationDisposition, ValidationStore};
