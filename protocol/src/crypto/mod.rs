//! # Cryptographic Primitives for PULSAR
//!
//! This module is the foundation of everything security-related in the
//! protocol. Every proposal, validation, and manifest signature, every
//! ledger and transaction-set hash flows through here.
//!
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **Ed25519** for signatures: fast, deterministic, and nobody has broken it.
//! - **BLAKE3** for content hashing, always under a named domain. There
//!   is no undomained hash helper in this crate on purpose.
//! - **SHA-256** for account-id derivation: because the rest of the world
//!   still expects it at the identity boundary.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize these functions, please
//! reconsider. Then reconsider again. Then go read about timing attacks
//! and come back when you've lost the urge.

pub mod hash;
pub mod keys;

// Re-export the things people actually need so they don't have to memorize
// our module hierarchy. Life's too short for five levels of `use` statements.
pub use hash::{account_id, domain_hash, domain_hash_parts, merkle_root, AccountId, Hash256};
pub use keys::{PulsarKeypair, PulsarPublicKey, PulsarSignature};
