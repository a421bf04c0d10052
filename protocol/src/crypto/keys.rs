//! # Validator Key Management
//!
//! Ed25519 keypair generation and serialization for PULSAR validator
//! identities.
//!
//! Every validator on the network holds at least one Ed25519 keypair; the
//! long-term master key and the rotating signing key in a manifest are both
//! of this kind. This module handles creation, serialization, and signing.
//!
//! ## Why Ed25519?
//!
//! - Deterministic signatures (no k-value footguns like ECDSA).
//! - 128-bit security level in 32+32 bytes. Compact and sufficient.
//! - Fast verification, which matters when a single tick can check a few
//!   hundred proposal and validation signatures.
//!
//! ## Security considerations
//!
//! - We use OS-level RNG (`OsRng`) for key generation. If your OS RNG is
//!   broken, you have bigger problems than PULSAR.
//! - Key bytes are never logged. If you add logging to this module,
//!   you will be asked to leave.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur during key operations.
///
/// These are intentionally vague about *why* something failed. Leaking
/// details about key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// A PULSAR validator keypair wrapping Ed25519 signing and verification keys.
///
/// This is the atomic unit of identity in the protocol. Every proposal,
/// validation, and manifest ultimately traces back to one of these.
///
/// ## Serialization
///
/// `PulsarKeypair` intentionally does NOT implement `Serialize`/`Deserialize`.
/// Serializing private keys should be a deliberate, conscious act, not
/// something that happens because someone shoved a keypair into a JSON
/// response. Use `to_bytes()` / `from_bytes()` explicitly.
///
/// # Examples
///
/// ```
/// use pulsar_protocol::crypto::keys::PulsarKeypair;
///
/// let kp = PulsarKeypair::generate();
/// let msg = b"validate ledger 7";
/// let sig = kp.sign(msg);
/// assert!(kp.public_key().verify(msg, &sig));
/// ```
pub struct PulsarKeypair {
    /// The Ed25519 signing (private) key. 32 bytes of pure responsibility.
    signing_key: SigningKey,
}

/// The public half of a validator identity, safe to share with the world.
///
/// This is what appears in proposals, validations, manifests, and the UNL.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PulsarPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature over a message.
///
/// 64 bytes, deterministic for a given (key, message) pair. Stored as
/// `Vec<u8>` for serde compatibility, but always exactly 64 bytes when
/// produced by us. If someone hands us a signature that isn't 64 bytes,
/// verification simply returns `false`. No panics, no undefined behavior.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulsarSignature {
    bytes: Vec<u8>,
}

impl PulsarKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Constructs a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed. Useful for deriving
    /// fixed validator identities in tests and devnet genesis.
    ///
    /// **Warning**: a weak seed gives a weak key. Use a proper CSPRNG or
    /// KDF to produce the seed bytes.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    ///
    /// Convenience for loading validator keys from config. Please don't put
    /// raw hex keys in config files in production; for devnet, we're not
    /// going to pretend you won't do it anyway.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let mut arr = [0u8; SECRET_KEY_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_seed(&arr))
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> PulsarPublicKey {
        PulsarPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message and return a `PulsarSignature`.
    ///
    /// Ed25519 signatures are deterministic: the same (key, message) pair
    /// always produces the same signature. No nonce management, no sleepless
    /// nights wondering if your RNG was seeded properly at signing time.
    pub fn sign(&self, message: &[u8]) -> PulsarSignature {
        let sig = self.signing_key.sign(message);
        PulsarSignature {
            bytes: sig.to_bytes().to_vec(),
        }
    }

    /// Exports the raw 32-byte secret key material.
    ///
    /// **Handle with extreme care.** This is the only secret that stands
    /// between an attacker and this validator's entire identity. Don't log
    /// it, don't gossip it, don't put it in a file called `my_keys.txt`.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self::from_seed(secret)
    }
}

impl Clone for PulsarKeypair {
    /// Cloning a keypair is allowed but should make you uncomfortable.
    /// Every copy of a private key is another thing to protect.
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for PulsarKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material in debug output. Not even
        // "partially". A partial leak is still a leak.
        write!(f, "PulsarKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// PulsarPublicKey
// ---------------------------------------------------------------------------

impl PulsarPublicKey {
    /// Create a `PulsarPublicKey` from raw bytes.
    ///
    /// Does not validate that the bytes form a valid curve point; use
    /// [`try_from_slice`](Self::try_from_slice) at trust boundaries.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Try to create a `PulsarPublicKey` from a byte slice.
    ///
    /// Validates the length and that the bytes represent a valid Ed25519
    /// point. Some 32-byte values aren't valid points on the curve, and we
    /// don't want those anywhere near the UNL.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != 32 {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);

        // Catches low-order points and other degenerate cases.
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;

        Ok(Self { bytes })
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a signature against this public key.
    ///
    /// Returns `true` if the signature is valid, `false` otherwise. A
    /// boolean rather than a `Result` because the ingest paths just want a
    /// yes/no answer and map `false` to a disposition, not an error.
    pub fn verify(&self, message: &[u8], signature: &PulsarSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig_bytes: [u8; 64] = match signature.bytes.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let dalek_sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }

    /// Hex-encoded representation. 64 characters for 32 bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded public key string.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    /// Base58-encoded representation, the compact display form used in
    /// operator-facing output.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.bytes).into_string()
    }
}

impl Hash for PulsarPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for PulsarPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PulsarPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PulsarPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// PulsarSignature
// ---------------------------------------------------------------------------

impl PulsarSignature {
    /// Create a signature from its raw 64-byte representation.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Returns the raw signature bytes (64 bytes for valid signatures).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the hex-encoded signature string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for PulsarSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PulsarSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "PulsarSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "PulsarSignature({})", hex_str)
        }
    }
}
