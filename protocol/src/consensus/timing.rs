//! # Ledger Timing Rules
//!
//! The pure functions behind every timing decision the round driver makes:
//! when to close the open ledger, whether the establish phase has reached
//! consensus, how coarsely close times are recorded, and how a close time
//! rounds to its resolution.
//!
//! Everything here is referentially transparent. The driver feeds in
//! counters and elapsed times; these functions never read a clock, never
//! touch a store, and never log. That makes them trivially testable and,
//! more importantly, makes the driver's behavior auditable: the entire
//! timing policy of the network is on this one page.
//!
//! ## The avalanche schedule
//!
//! Agreement thresholds climb as a round ages relative to the previous
//! round's agreement time: 50% while fresh, 65% at midlife, 70% late, and
//! 95% when stuck. A young round is permissive so positions can converge;
//! a stuck round demands near-unanimity so the network converges on
//! *something* rather than splitting.

use crate::config::{
    AV_INIT_CONSENSUS_PCT, AV_LATE_CONSENSUS_PCT, AV_LATE_CONSENSUS_TIME, AV_MID_CONSENSUS_PCT,
    AV_MID_CONSENSUS_TIME, AV_STUCK_CONSENSUS_PCT, AV_STUCK_CONSENSUS_TIME,
    CLOSE_RESOLUTIONS_SECS, DECREASE_RESOLUTION_EVERY, INCREASE_RESOLUTION_EVERY,
    LEDGER_MIN_CLOSE_MS, LEDGER_MIN_CONSENSUS_MS, MIN_CONSENSUS_PCT,
};

/// Floor for the previous round's agreement time when computing schedule
/// position. Without it, one freakishly fast round would slam the next
/// round straight into the stuck threshold.
const AV_MIN_CONSENSUS_MS: u64 = 5_000;

/// Upper sanity bound on round timing inputs. Ten minutes of round time
/// means our previous-round bookkeeping is garbage; close and resync.
const ROUND_SANITY_MS: u64 = 10 * 60 * 1_000;

// ---------------------------------------------------------------------------
// ConsensusOutcome
// ---------------------------------------------------------------------------

/// The establish phase's verdict for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusOutcome {
    /// Keep working; no decision yet.
    No,
    /// The network has finished this round without us. Stop proposing,
    /// adopt the network's ledger, and rejoin on the next round.
    MovedOn,
    /// Enough proposers agree with our position. Close it out.
    Yes,
}

// ---------------------------------------------------------------------------
// should_close_ledger
// ---------------------------------------------------------------------------

/// Decide whether the open ledger should close now.
///
/// Inputs are counters the driver reads from its stores each tick:
///
/// * `any_txns` — is anything waiting in the open set?
/// * `prev_proposers` — proposers seen in the previous round.
/// * `proposers_closed` — peers that have closed the current open ledger.
/// * `proposers_validated` — peers that have already validated past it.
/// * `prev_round_ms` — how long the previous round took to agree.
/// * `since_close_ms` — time since the previous ledger closed.
/// * `open_ms` — how long the current ledger has been open.
/// * `idle_interval_secs` — empty-network close cadence.
#[allow(clippy::too_many_arguments)]
pub fn should_close_ledger(
    any_txns: bool,
    prev_proposers: usize,
    proposers_closed: usize,
    proposers_validated: usize,
    prev_round_ms: u64,
    since_close_ms: u64,
    open_ms: u64,
    idle_interval_secs: u64,
) -> bool {
    // Out-of-range timing data means state we can't reason from. Close and
    // let the next round start from clean measurements.
    if prev_round_ms > ROUND_SANITY_MS || since_close_ms > ROUND_SANITY_MS {
        return true;
    }

    // Never close faster than the floor, no matter what peers do.
    if since_close_ms < LEDGER_MIN_CLOSE_MS {
        return false;
    }

    // Quiet network: nobody proposing, nothing pending, idle window not
    // yet expired. Leave the ledger open.
    if prev_proposers == 0
        && proposers_closed == 0
        && !any_txns
        && open_ms < idle_interval_secs * 1_000
    {
        return false;
    }

    // More than half of the previous round's proposers have moved past the
    // open phase. Following the majority cannot be a premature close.
    if proposers_closed + proposers_validated > prev_proposers / 2 {
        return true;
    }

    // Hold the ledger open at least as long as the previous round took,
    // so round pacing tracks what the network can actually sustain.
    if open_ms < prev_round_ms.max(LEDGER_MIN_CLOSE_MS) {
        return false;
    }

    // Past the pacing floor: close on pending transactions, idle expiry,
    // or a majority of previous proposers having closed.
    any_txns || open_ms >= idle_interval_secs * 1_000 || proposers_closed * 2 > prev_proposers
}

// ---------------------------------------------------------------------------
// avalanche_threshold
// ---------------------------------------------------------------------------

/// The yes-vote percentage required at this point in the round.
///
/// Position on the schedule is `cur_agree_ms` as a percentage of the
/// previous round's agreement time (floored at [`AV_MIN_CONSENSUS_MS`]).
/// Shared by round-level consensus checks and per-transaction dispute
/// voting, so both climb in lockstep.
pub fn avalanche_threshold(cur_agree_ms: u64, prev_agree_ms: u64) -> u32 {
    let prev = prev_agree_ms.max(AV_MIN_CONSENSUS_MS);
    let percent_of_prev = (cur_agree_ms.saturating_mul(100) / prev) as u32;

    if percent_of_prev < AV_MID_CONSENSUS_TIME {
        AV_INIT_CONSENSUS_PCT
    } else if percent_of_prev < AV_LATE_CONSENSUS_TIME {
        AV_MID_CONSENSUS_PCT
    } else if percent_of_prev < AV_STUCK_CONSENSUS_TIME {
        AV_LATE_CONSENSUS_PCT
    } else {
        AV_STUCK_CONSENSUS_PCT
    }
}

// ---------------------------------------------------------------------------
// check_consensus
// ---------------------------------------------------------------------------

/// Decide whether the establish phase has concluded.
///
/// * `prev_proposers` / `cur_proposers` — proposer counts, last round and
///   this round.
/// * `cur_agree` — proposers currently agreeing with our position.
/// * `cur_finished` — proposers that have already validated a ledger at
///   this sequence (they consider the round over).
/// * `prev_agree_ms` — how long the previous round took to agree.
/// * `cur_agree_ms` — how long we have been establishing.
pub fn check_consensus(
    prev_proposers: usize,
    cur_proposers: usize,
    cur_agree: usize,
    cur_finished: usize,
    prev_agree_ms: u64,
    cur_agree_ms: u64,
) -> ConsensusOutcome {
    // The network finished without us: 80% of current proposers have
    // validated a ledger at this sequence.
    if cur_finished * 100 >= MIN_CONSENSUS_PCT as usize * cur_proposers.max(1) {
        return ConsensusOutcome::MovedOn;
    }

    // Declaring consensus before the floor invites split rounds on fast
    // local links.
    if cur_agree_ms < LEDGER_MIN_CONSENSUS_MS {
        return ConsensusOutcome::No;
    }

    // Far fewer proposers than the last round means peers are still
    // arriving; give them a little longer before counting noses.
    if cur_proposers < prev_proposers * 3 / 4
        && cur_agree_ms < LEDGER_MIN_CONSENSUS_MS + LEDGER_MIN_CLOSE_MS
    {
        return ConsensusOutcome::No;
    }

    // Strictly more than the scheduled share must agree. An exact split
    // (3 of 6 at the 50% mark) is not agreement, it is a coin toss, and
    // closing on it forks the network down both sides.
    let threshold = avalanche_threshold(cur_agree_ms, prev_agree_ms) as usize;
    if cur_agree * 100 > threshold * cur_proposers.max(1) {
        return ConsensusOutcome::Yes;
    }

    ConsensusOutcome::No
}

// ---------------------------------------------------------------------------
// next_time_resolution
// ---------------------------------------------------------------------------

/// Choose the close-time resolution for the next round.
///
/// Walks the fixed ladder {10, 20, 30, 60, 90, 120} seconds: step coarser
/// every [`INCREASE_RESOLUTION_EVERY`] sequences while close times fail to
/// agree, step finer every [`DECREASE_RESOLUTION_EVERY`] sequences while
/// they agree, saturating at both ends. Off-boundary sequences keep the
/// current resolution.
pub fn next_time_resolution(prev_resolution: u32, prev_agree: bool, ledger_seq: u32) -> u32 {
    let ladder = &CLOSE_RESOLUTIONS_SECS;
    // An unknown resolution can only come from corrupted input; re-enter
    // the ladder at its midpoint.
    let idx = ladder
        .iter()
        .position(|&r| r == prev_resolution)
        .unwrap_or(ladder.len() / 2);

    if !prev_agree && ledger_seq % INCREASE_RESOLUTION_EVERY == 0 {
        let next = (idx + 1).min(ladder.len() - 1);
        return ladder[next];
    }

    if prev_agree && ledger_seq % DECREASE_RESOLUTION_EVERY == 0 {
        let next = idx.saturating_sub(1);
        return ladder[next];
    }

    ladder[idx]
}

// ---------------------------------------------------------------------------
// round_close_time
// ---------------------------------------------------------------------------

/// Round a close time (network seconds) to a multiple of the resolution,
/// half-up. Zero is the "no close time" sentinel and maps to itself.
pub fn round_close_time(close_time: u64, resolution: u32) -> u64 {
    if close_time == 0 || resolution == 0 {
        return close_time;
    }
    let res = resolution as u64;
    (close_time + res / 2) / res * res
}

/// The close time actually recorded in a header: the rounded time, but
/// strictly after the parent's close time. Two ledgers closing in the
/// same resolution bucket must still have distinct, ordered close times.
pub fn effective_close_time(proposed: u64, resolution: u32, parent_close_time: u64) -> u64 {
    round_close_time(proposed, resolution).max(parent_close_time + 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- should_close_ledger ------------------------------------------------

    #[test]
    fn close_refused_below_minimum() {
        // 1 second since close is under the 2 second floor, always.
        assert!(!should_close_ledger(true, 10, 10, 10, 3_000, 1_000, 1_000, 15));
    }

    #[test]
    fn close_refused_on_idle_network() {
        // Nobody proposing, no transactions, idle window not expired.
        assert!(!should_close_ledger(false, 0, 0, 0, 3_000, 5_000, 5_000, 15));
    }

    #[test]
    fn close_on_idle_expiry() {
        // Still no transactions, but the idle interval has passed.
        assert!(should_close_ledger(false, 0, 0, 0, 3_000, 16_000, 16_000, 15));
    }

    #[test]
    fn close_follows_peer_majority() {
        // 6 of 10 previous proposers have closed; we follow regardless of
        // our own open time.
        assert!(should_close_ledger(false, 10, 6, 0, 3_000, 2_500, 2_500, 15));
    }

    #[test]
    fn close_waits_for_previous_round_pace() {
        // Transactions pending, but the previous round took 6 seconds and
        // we have been open only 3.
        assert!(!should_close_ledger(true, 10, 0, 0, 6_000, 3_000, 3_000, 15));
        // Once we match the previous round's pace, close.
        assert!(should_close_ledger(true, 10, 0, 0, 6_000, 6_500, 6_500, 15));
    }

    #[test]
    fn close_on_garbage_timing_data() {
        // An absurd previous round duration forces a close.
        assert!(should_close_ledger(false, 0, 0, 0, 11 * 60 * 1_000, 2_500, 100, 15));
    }

    // -- avalanche_threshold ------------------------------------------------

    #[test]
    fn threshold_schedule_progression() {
        let prev = 10_000u64;
        assert_eq!(avalanche_threshold(0, prev), 50);
        assert_eq!(avalanche_threshold(4_900, prev), 50);
        assert_eq!(avalanche_threshold(5_000, prev), 65);
        assert_eq!(avalanche_threshold(8_400, prev), 65);
        assert_eq!(avalanche_threshold(8_500, prev), 70);
        assert_eq!(avalanche_threshold(19_900, prev), 70);
        assert_eq!(avalanche_threshold(20_000, prev), 95);
    }

    #[test]
    fn threshold_floors_previous_round_time() {
        // A 1 ms previous round must not put tick one at 95%.
        assert_eq!(avalanche_threshold(1_000, 1), 50);
    }

    // -- check_consensus ----------------------------------------------------

    #[test]
    fn no_data_is_no_consensus() {
        // Spec boundary case: all zeros.
        assert_eq!(check_consensus(0, 0, 0, 0, 0, 0), ConsensusOutcome::No);
    }

    #[test]
    fn unanimous_past_minimum_is_yes() {
        // Spec boundary case: 100% agreement after 30 s of establishing.
        assert_eq!(
            check_consensus(0, 10, 10, 0, 0, 30_000),
            ConsensusOutcome::Yes
        );
    }

    #[test]
    fn network_finished_without_us_is_moved_on() {
        // Spec boundary case: 9 of 10 proposers already validated.
        assert_eq!(
            check_consensus(0, 10, 0, 9, 0, 0),
            ConsensusOutcome::MovedOn
        );
    }

    #[test]
    fn too_early_is_no_even_if_unanimous() {
        assert_eq!(
            check_consensus(10, 10, 10, 0, 5_000, 1_500),
            ConsensusOutcome::No
        );
    }

    #[test]
    fn missing_proposers_slow_the_verdict() {
        // 5 of 10 previous proposers present: hold the verdict until the
        // extended floor passes, then proceed normally.
        assert_eq!(
            check_consensus(10, 5, 5, 0, 5_000, 2_500),
            ConsensusOutcome::No
        );
        assert_eq!(
            check_consensus(10, 5, 5, 0, 5_000, 4_500),
            ConsensusOutcome::Yes
        );
    }

    #[test]
    fn exact_split_at_threshold_is_not_consensus() {
        // 3 of 6 at the 50% mark: a coin toss, not a verdict.
        assert_eq!(
            check_consensus(6, 6, 3, 0, 5_000, 2_500),
            ConsensusOutcome::No
        );
    }

    #[test]
    fn threshold_climbs_with_round_age() {
        // 60% agreement: enough while the threshold is 50%, not enough
        // once the schedule reaches 65%.
        assert_eq!(
            check_consensus(10, 10, 6, 0, 20_000, 4_000),
            ConsensusOutcome::Yes
        );
        assert_eq!(
            check_consensus(10, 10, 6, 0, 20_000, 12_000),
            ConsensusOutcome::No
        );
    }

    // -- next_time_resolution -----------------------------------------------

    #[test]
    fn resolution_steps_up_on_disagreement_boundary() {
        assert_eq!(next_time_resolution(30, false, 8), 60);
        assert_eq!(next_time_resolution(30, false, 16), 60);
    }

    #[test]
    fn resolution_holds_off_boundary() {
        assert_eq!(next_time_resolution(30, false, 7), 30);
        assert_eq!(next_time_resolution(30, false, 9), 30);
    }

    #[test]
    fn resolution_steps_down_on_agreement() {
        // DECREASE_RESOLUTION_EVERY is 1: every agreeing ledger steps finer.
        assert_eq!(next_time_resolution(30, true, 5), 20);
        assert_eq!(next_time_resolution(20, true, 6), 10);
    }

    #[test]
    fn resolution_saturates_at_both_ends() {
        assert_eq!(next_time_resolution(10, true, 1), 10);
        assert_eq!(next_time_resolution(120, false, 8), 120);
    }

    #[test]
    fn resolution_fixed_point_mid_ladder() {
        // Off both step boundaries, the resolution is a fixed point.
        let r = next_time_resolution(60, false, 3);
        assert_eq!(r, 60);
        assert_eq!(next_time_resolution(r, false, 3), r);
    }

    // -- round_close_time ---------------------------------------------------

    #[test]
    fn close_time_rounds_half_up() {
        assert_eq!(round_close_time(14, 10), 10);
        assert_eq!(round_close_time(15, 10), 20);
        assert_eq!(round_close_time(100, 30), 90);
        assert_eq!(round_close_time(105, 30), 120);
    }

    #[test]
    fn close_time_zero_maps_to_zero() {
        assert_eq!(round_close_time(0, 10), 0);
        assert_eq!(round_close_time(0, 120), 0);
    }

    #[test]
    fn close_time_is_multiple_of_resolution() {
        for res in crate::config::CLOSE_RESOLUTIONS_SECS {
            for t in [1u64, 7, 33, 59, 1_000_000_007] {
                let rounded = round_close_time(t, res);
                assert_eq!(rounded % res as u64, 0, "t={} res={}", t, res);
            }
        }
    }

    #[test]
    fn close_time_rounding_is_idempotent() {
        for res in crate::config::CLOSE_RESOLUTIONS_SECS {
            for t in [1u64, 44, 120, 86_400, 1_700_000_123] {
                let once = round_close_time(t, res);
                assert_eq!(round_close_time(once, res), once);
            }
        }
    }

    #[test]
    fn effective_close_time_is_after_parent() {
        // Rounding collides with the parent's close time: step past it.
        assert_eq!(effective_close_time(100, 30, 90), 91);
        // No collision: the rounded time stands.
        assert_eq!(effective_close_time(130, 30, 90), 120);
    }
}
