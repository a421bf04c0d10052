//! # Storage Module
//!
//! Persistence and caching for the consensus core. This module provides
//! the node-object store that everything durable sits on, the object
//! cache in front of it, and the in-memory ledger history the driver
//! navigates.
//!
//! ## Architecture
//!
//! ```text
//! node_store.rs — NodeStore capability trait + memory/sled backends
//! cache.rs      — two-level (positive/negative) canonicalizing cache
//! history.rs    — ledgers by hash, headers by seq, the LCL pointer
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Backends behind a trait object.** The store is a capability set
//!    (fetch/store/for_each/write_load/close); a backend is a concrete
//!    variant registered by name and selected from config. Consensus code
//!    never knows which engine it is talking to.
//!
//! 2. **Negative caching.** "I already know it isn't there" saves a disk
//!    round-trip per repeated miss, and the acquirer asks about missing
//!    hashes constantly while a fetch is in flight.
//!
//! 3. **Canonical instances.** Concurrent fetchers of one hash end up
//!    holding the same `Arc<NodeObject>`, not two copies of equal bytes.

pub mod cache;
pub mod history;
pub mod node_store;

pub use cache::{CacheLookup, ObjectCache};
pub use history::LedgerHistory;
pub use node_store::{open_backend, MemoryStore, NodeObject, NodeStore, SledStore, StoreError};
