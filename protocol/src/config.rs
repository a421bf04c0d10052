//! # Protocol Configuration & Constants
//!
//! Every magic number in PULSAR lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Most of these values are consensus-critical: two nodes that disagree on
//! the avalanche schedule or the close-time resolutions will happily diverge
//! and then blame each other. Changing them after mainnet launch is somewhere
//! between "difficult" and "career-ending", so choose wisely during devnet.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet. The real deal. Mistakes here cost real money.
pub const NETWORK_ID_MAINNET: u32 = 0x504C_5352; // "PLSR" in ASCII hex.

/// Testnet, where we break things on purpose and call it "testing."
pub const NETWORK_ID_TESTNET: u32 = 0x504C_5354; // "PLST"

/// Devnet. Reset weekly, no promises, no survivors.
pub const NETWORK_ID_DEVNET: u32 = 0x504C_5344; // "PLSD"

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol magic bytes used in the P2P wire format preamble. Every PULSAR
/// message on the wire starts with these 4 bytes so peers can quickly reject
/// non-PULSAR traffic without parsing further.
pub const PROTOCOL_MAGIC: u32 = 0x414C_4153; // "ALAS" — A Ledger for Autonomous Settlement

/// Wire protocol version for P2P messages. Separate from the crate version
/// because networking changes don't always mean consensus changes.
pub const WIRE_PROTOCOL_VERSION: u16 = 1;

/// The full version string, assembled at compile time so we don't allocate
/// for something this trivial at runtime.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Round Timing
// ---------------------------------------------------------------------------

/// The heartbeat of the consensus engine. The round driver is ticked once
/// per granule; every state transition happens on a tick boundary.
pub const LEDGER_GRANULARITY: Duration = Duration::from_millis(1_000);

/// Granularity as milliseconds, for the arithmetic-heavy call sites.
pub const LEDGER_GRANULARITY_MS: u64 = 1_000;

/// Minimum time a ledger must stay open before we consider closing it.
/// Closing faster than this outruns honest peers on real networks.
pub const LEDGER_MIN_CLOSE_MS: u64 = 2_000;

/// Minimum time we spend in the establish phase before declaring consensus,
/// no matter how unanimous the proposals look.
pub const LEDGER_MIN_CONSENSUS_MS: u64 = 2_000;

/// How long the network may sit with no transactions before we close an
/// empty ledger anyway, in seconds. Keeps close times advancing on a quiet
/// network so validations don't go stale.
pub const LEDGER_IDLE_INTERVAL_SECS: u64 = 15;

/// A validation is current until this long after its sign time, in seconds.
pub const LEDGER_VAL_INTERVAL_SECS: u64 = 300;

/// A validation may be signed at most this far in the future relative to
/// our wall clock, in seconds. Tolerates clock skew without accepting
/// validations from next Tuesday.
pub const LEDGER_EARLY_INTERVAL_SECS: u64 = 180;

/// A peer proposal is stale after this many seconds and gets swept.
pub const PROPOSE_FRESHNESS_SECS: u64 = 20;

/// How often we rebroadcast our current proposal even if it is unchanged,
/// in seconds. Late joiners need to hear it too.
pub const PROPOSE_INTERVAL_SECS: u64 = 12;

// ---------------------------------------------------------------------------
// Avalanche Schedule
// ---------------------------------------------------------------------------
//
// The percentage of agreeing proposers a transaction (or the round itself)
// needs climbs as the round ages, measured against the previous round's
// agreement time. Fresh rounds are permissive; stuck rounds demand
// near-unanimity so the network converges on *something*.

/// Percentage of trusted validators that must agree on a ledger before it
/// is fully validated, and the moved-on threshold for abandoned rounds.
pub const MIN_CONSENSUS_PCT: u32 = 80;

/// Initial yes-vote threshold, in percent.
pub const AV_INIT_CONSENSUS_PCT: u32 = 50;

/// After this percentage of the previous round's agree time...
pub const AV_MID_CONSENSUS_TIME: u32 = 50;
/// ...the threshold rises to this.
pub const AV_MID_CONSENSUS_PCT: u32 = 65;

/// Late-round boundary, percent of previous agree time.
pub const AV_LATE_CONSENSUS_TIME: u32 = 85;
/// Late-round threshold, percent.
pub const AV_LATE_CONSENSUS_PCT: u32 = 70;

/// Stuck-round boundary, percent of previous agree time.
pub const AV_STUCK_CONSENSUS_TIME: u32 = 200;
/// Stuck-round threshold. At 95% we are essentially asking for unanimity
/// minus rounding.
pub const AV_STUCK_CONSENSUS_PCT: u32 = 95;

// ---------------------------------------------------------------------------
// Close-Time Resolution
// ---------------------------------------------------------------------------

/// The permitted close-time resolutions, in seconds, coarse to fine tuning
/// handled by [`next_time_resolution`](crate::consensus::timing::next_time_resolution).
/// Consensus-critical: every node must agree on this ladder.
pub const CLOSE_RESOLUTIONS_SECS: [u32; 6] = [10, 20, 30, 60, 90, 120];

/// Step the resolution up (coarser) every this many ledgers while the
/// network is failing to agree on close times.
pub const INCREASE_RESOLUTION_EVERY: u32 = 8;

/// Step the resolution down (finer) every this many ledgers while close
/// times are agreeing.
pub const DECREASE_RESOLUTION_EVERY: u32 = 1;

// ---------------------------------------------------------------------------
// Inbound Ledger Acquisition
// ---------------------------------------------------------------------------

/// How long we wait for a peer to answer a `GetLedger` before trying the
/// next peer, in milliseconds.
pub const PEER_REPLY_MS: u64 = 2_500;

/// Maximum number of peers queried concurrently for one ledger hash.
pub const ACQUIRE_PEER_LIMIT: usize = 8;

/// How many times a single peer may time out on one acquisition before we
/// drop it from that acquisition.
pub const ACQUIRE_PEER_MAX_RETRIES: u32 = 3;

/// Give up on a consensus-critical acquisition after this long, in seconds.
pub const ACQUIRE_DEADLINE_CONSENSUS_SECS: u64 = 60;

/// Historical back-fill can afford to be patient.
pub const ACQUIRE_DEADLINE_HISTORY_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Validation Retention
// ---------------------------------------------------------------------------

/// Expired validations stay queryable for ancestry checks until they fall
/// this many sequences behind the highest sequence we have seen.
pub const VALIDATION_RETENTION_SEQS: u32 = 256;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default P2P listening port.
pub const DEFAULT_P2P_PORT: u16 = 9780;

/// Default RPC API port.
pub const DEFAULT_RPC_PORT: u16 = 9781;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9782;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns a friendly name for a network ID, mainly for logging.
/// Unknown networks get a hex dump because we're helpful like that.
pub fn network_name(network_id: u32) -> String {
    match network_id {
        NETWORK_ID_MAINNET => "mainnet".to_string(),
        NETWORK_ID_TESTNET => "testnet".to_string(),
        NETWORK_ID_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_ids_are_distinct() {
        // If these collide, someone has been editing hex while sleep-deprived.
        assert_ne!(NETWORK_ID_MAINNET, NETWORK_ID_TESTNET);
        assert_ne!(NETWORK_ID_MAINNET, NETWORK_ID_DEVNET);
        assert_ne!(NETWORK_ID_TESTNET, NETWORK_ID_DEVNET);
    }

    #[test]
    fn test_protocol_magic_is_valid_ascii() {
        // The magic bytes should decode to a readable 4-char ASCII tag.
        let bytes = PROTOCOL_MAGIC.to_be_bytes();
        assert!(bytes.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_network_name_formatting() {
        assert_eq!(network_name(NETWORK_ID_MAINNET), "mainnet");
        assert_eq!(network_name(0xCAFEBABE), "unknown(0xCAFEBABE)");
    }

    #[test]
    fn test_round_timing_sanity() {
        // A round must be allowed to stay open at least one full granule,
        // and the minimum establish time must cover at least one granule too.
        assert!(LEDGER_MIN_CLOSE_MS >= LEDGER_GRANULARITY_MS);
        assert!(LEDGER_MIN_CONSENSUS_MS >= LEDGER_GRANULARITY_MS);
        assert_eq!(LEDGER_GRANULARITY.as_millis() as u64, LEDGER_GRANULARITY_MS);
    }

    #[test]
    fn test_avalanche_schedule_is_monotonic() {
        // Thresholds must only rise as the round ages. A schedule that
        // relaxes over time never converges.
        assert!(AV_INIT_CONSENSUS_PCT < AV_MID_CONSENSUS_PCT);
        assert!(AV_MID_CONSENSUS_PCT < AV_LATE_CONSENSUS_PCT);
        assert!(AV_LATE_CONSENSUS_PCT < AV_STUCK_CONSENSUS_PCT);
        assert!(AV_MID_CONSENSUS_TIME < AV_LATE_CONSENSUS_TIME);
        assert!(AV_LATE_CONSENSUS_TIME < AV_STUCK_CONSENSUS_TIME);
        assert!(AV_STUCK_CONSENSUS_PCT <= 100);
    }

    #[test]
    fn test_close_resolutions_sorted_and_distinct() {
        for pair in CLOSE_RESOLUTIONS_SECS.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_validation_window_covers_proposal_freshness() {
        // A proposal that is still fresh must not already be outside the
        // validation window, or we'd propose on ledgers we refuse to validate.
        assert!(PROPOSE_FRESHNESS_SECS < LEDGER_VAL_INTERVAL_SECS);
        assert!(LEDGER_EARLY_INTERVAL_SECS < LEDGER_VAL_INTERVAL_SECS);
    }

    #[test]
    fn test_acquire_deadlines_ordered() {
        // Consensus fetches are urgent; history fetches are background work.
        assert!(ACQUIRE_DEADLINE_CONSENSUS_SECS < ACQUIRE_DEADLINE_HISTORY_SECS);
        assert!(PEER_REPLY_MS * (ACQUIRE_PEER_MAX_RETRIES as u64) < ACQUIRE_DEADLINE_CONSENSUS_SECS * 1_000);
    }
}
