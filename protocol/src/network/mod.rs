//! # Network Module
//!
//! The consensus core's face toward the peer overlay: the binary wire
//! format peers exchange, and the inbound-ledger acquirer that fetches
//! ledgers we hear about but do not hold.
//!
//! ## Architecture
//!
//! ```text
//! wire.rs    — length-prefixed, versioned peer messages (bincode payloads)
//! acquire.rs — deduplicated by-hash ledger acquisition with retry/timeout
//! ```
//!
//! ## Design Decisions
//!
//! - The overlay transport itself (sockets, peer discovery, gossip
//!   routing) is an external collaborator. This module defines what goes
//!   on the wire and what to do with what comes off it; moving bytes is
//!   somebody else's job.
//! - Ingest never throws. Peer-supplied data resolves to a disposition
//!   enum; the worst a malicious peer can achieve here is a log line and
//!   a reputation debit upstream.

pub mod acquire;
pub mod wire;

pub use acquire::{
    AcquireReason, DataDisposition, FetchedLedger, InboundLedgers, PeerId, PeerRequest,
};
pub use wire::{LedgerNode, LedgerQuery, PeerMessage, WireError};
