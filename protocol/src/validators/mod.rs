//! # Validator Identity
//!
//! Who do we trust, and which key are they signing with today?
//!
//! ```text
//! unl.rs      — the Unique Node List: trusted master keys and quorum math
//! manifest.rs — signed master-to-signing-key rotation records
//! ```
//!
//! A validator's long-term identity is its master key; the key that
//! actually signs proposals and validations rotates via manifests. The
//! UNL resolves signing keys back to master identities so the consensus
//! stores can count one validator exactly once, no matter how many times
//! it has rotated.

pub mod manifest;
pub mod unl;

pub use manifest::{Manifest, ManifestDisposition};
pub use unl::TrustedValidators;
