//! # Peer Wire Format
//!
//! Binary, length-prefixed, versioned messages. Every frame is:
//!
//! ```text
//! ┌────────────┬──────────────┬────────────┬───────────────────┐
//! │ magic: u32 │ version: u16 │ length:u32 │ bincode payload   │
//! │  (BE)      │  (BE)        │  (BE)      │  (length bytes)   │
//! └────────────┴──────────────┴────────────┴───────────────────┘
//! ```
//!
//! The magic preamble lets a peer reject non-PULSAR traffic after four
//! bytes. The version field is separate from the payload so a future
//! format change doesn't need to parse the old format to detect itself.
//! Payloads are bincode: compact, deterministic, and round-trips are
//! bit-identical, which the gossip relays rely on (a re-encoded message
//! must re-hash to the same bytes).

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PROTOCOL_MAGIC, WIRE_PROTOCOL_VERSION};
use crate::consensus::proposal::Proposal;
use crate::consensus::validation::Validation;
use crate::crypto::hash::Hash256;
use crate::ledger::header::LedgerHeader;
use crate::validators::manifest::Manifest;

/// Frames larger than this are hostile, not chatty.
const MAX_FRAME_BYTES: u32 = 4 * 1024 * 1024;

/// Frame header size: magic + version + length.
const FRAME_HEADER_BYTES: usize = 4 + 2 + 4;

/// What a `GetLedger` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerQuery {
    /// Just the header.
    Header,
    /// Header plus the full transaction set.
    Full,
    /// A fetch pack: the ledger plus ancestry data up to `query_depth`.
    FetchPack,
}

/// One chunk inside a `LedgerData` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerNode {
    /// The ledger header. Verified against the requested hash.
    Header(LedgerHeader),
    /// One transaction: id plus blob. The id must re-derive from the blob.
    Tx { id: Hash256, blob: Vec<u8> },
    /// A content-addressed state-map chunk. The id must derive from the
    /// blob under the state-node hash domain.
    StateNode { id: Hash256, blob: Vec<u8> },
}

/// Every message peers exchange with the consensus core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// "Send me ledger `hash`."
    GetLedger {
        hash: Hash256,
        query: LedgerQuery,
        query_depth: u32,
    },
    /// Response chunks for ledger `hash`.
    LedgerData {
        hash: Hash256,
        seq: u32,
        nodes: Vec<LedgerNode>,
    },
    /// A validator's round position.
    Propose(Proposal),
    /// A validator's assertion that a ledger is fully valid.
    Validation(Validation),
    /// A validator key rotation.
    Manifest(Manifest),
}

/// Errors from the wire codec.
#[derive(Debug, Error)]
pub enum WireError {
    /// The first four bytes are not ours. Drop the connection.
    #[error("bad protocol magic: 0x{0:08X}")]
    BadMagic(u32),

    /// A version we don't speak.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u16),

    /// Declared frame length exceeds the cap.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    FrameTooLarge(u32),

    /// The payload did not decode as any known message.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Encode a message into a framed byte buffer.
pub fn encode(message: &PeerMessage) -> Result<Vec<u8>, WireError> {
    let payload =
        bincode::serialize(message).map_err(|e| WireError::Malformed(e.to_string()))?;
    if payload.len() as u32 > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(payload.len() as u32));
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_BYTES + payload.len());
    frame.put_u32(PROTOCOL_MAGIC);
    frame.put_u16(WIRE_PROTOCOL_VERSION);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);
    Ok(frame.to_vec())
}

/// Try to decode one frame from the front of `buffer`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame;
/// the caller reads more bytes and tries again. On success the consumed
/// frame is drained from the buffer, so this can be called in a loop over
/// a stream.
pub fn decode(buffer: &mut BytesMut) -> Result<Option<PeerMessage>, WireError> {
    if buffer.len() < FRAME_HEADER_BYTES {
        return Ok(None);
    }

    // Peek the header without consuming, in case the payload is short.
    let magic = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
    if magic != PROTOCOL_MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    let version = u16::from_be_bytes([buffer[4], buffer[5]]);
    if version != WIRE_PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let length = u32::from_be_bytes([buffer[6], buffer[7], buffer[8], buffer[9]]);
    if length > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(length));
    }

    let total = FRAME_HEADER_BYTES + length as usize;
    if buffer.len() < total {
        return Ok(None);
    }

    buffer.advance(FRAME_HEADER_BYTES);
    let payload = buffer.split_to(length as usize);
    let message =
        bincode::deserialize(&payload).map_err(|e| WireError::Malformed(e.to_string()))?;
    Ok(Some(message))
}
