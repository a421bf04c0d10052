//! # The Round Driver
//!
//! The per-ledger consensus state machine. Everything else in this crate
//! is either an input to this module or an output of it.
//!
//! ## Round State Machine
//!
//! ```text
//! Open ──> Establish ──> Accepted ──> Processing ──┐
//!   ^                                              │
//!   └──────────────── (next round) ────────────────┘
//! ```
//!
//! - **Open**: the ledger accumulates transactions. Each tick consults
//!   `should_close_ledger`; when it fires, we snapshot the open set, take
//!   our initial position, and broadcast it.
//! - **Establish**: positions are exchanged. Disputed transactions are
//!   voted on against the avalanche schedule, the close time converges on
//!   the mode of peer votes, and `check_consensus` decides each tick
//!   whether we are done, outvoted, or still working.
//! - **Accepted**: the agreed set is applied, the candidate ledger is
//!   built and persisted, and our validation goes out.
//! - **Processing**: wait for the validation quorum. Our candidate at
//!   quorum becomes the LCL; a competitor at quorum gets acquired and
//!   adopted instead.
//!
//! The driver is ticked, never threaded: one `tick()` at a time, no
//! transition concurrent with another, exactly one owner. Peer traffic
//! lands in the shared stores between ticks and the driver re-reads them
//! on its own schedule. All outward effects are returned as
//! [`ConsensusEvent`]s for the overlay to broadcast; the driver itself
//! never touches a socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{AV_STUCK_CONSENSUS_PCT, LEDGER_GRANULARITY};
use crate::consensus::clock::Clock;
use crate::consensus::positions::PositionStore;
use crate::consensus::proposal::Proposal;
use crate::consensus::timing::{
    avalanche_threshold, check_consensus, effective_close_time, next_time_resolution,
    round_close_time, should_close_ledger, ConsensusOutcome,
};
use crate::consensus::validation::Validation;
use crate::consensus::validations::ValidationStore;
use crate::crypto::hash::Hash256;
use crate::crypto::keys::PulsarKeypair;
use crate::ledger::apply::TxApplicator;
use crate::ledger::header::{Ledger, CLOSE_FLAG_NO_CONSENSUS_TIME};
use crate::ledger::tx_set::TxSet;
use crate::network::acquire::{AcquireReason, InboundLedgers};
use crate::storage::history::LedgerHistory;
use crate::storage::node_store::{NodeObject, NodeStore};
use crate::validators::unl::TrustedValidators;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for the round driver.
///
/// Defaults are the network constants; tests dial them down to make
/// multi-round scenarios run in milliseconds of simulated time.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Seconds the network may sit idle before closing an empty ledger.
    pub idle_interval_secs: u64,
    /// Seconds between rebroadcasts of an unchanged position.
    pub propose_interval_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: crate::config::LEDGER_IDLE_INTERVAL_SECS,
            propose_interval_secs: crate::config::PROPOSE_INTERVAL_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Every collaborator the driver consumes, wired up once at construction.
///
/// There is no process-wide singleton anywhere in this crate: components
/// are built bottom-up, handed to the driver in this context value, and
/// stopped top-down.
#[derive(Clone)]
pub struct CoreContext {
    pub clock: Arc<dyn Clock>,
    pub positions: Arc<PositionStore>,
    pub validations: Arc<ValidationStore>,
    pub tx_sets: Arc<TxSetCache>,
    pub acquirer: Arc<InboundLedgers>,
    pub applicator: Arc<dyn TxApplicator>,
    pub unl: Arc<TrustedValidators>,
    pub history: Arc<LedgerHistory>,
    pub store: Arc<dyn NodeStore>,
}

// ---------------------------------------------------------------------------
// TxSetCache
// ---------------------------------------------------------------------------

/// Transaction sets we know by root.
///
/// A proposal names its set by Merkle root only; the set bodies travel
/// separately. The overlay deposits every set it learns here, and the
/// driver looks peers' roots up when it builds disputes. A root we don't
/// have yet simply can't be disputed this tick.
#[derive(Default)]
pub struct TxSetCache {
    sets: RwLock<HashMap<Hash256, TxSet>>,
}

impl TxSetCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn a set, returning its root.
    pub fn insert(&self, set: TxSet) -> Hash256 {
        let root = set.root();
        self.sets.write().insert(root, set);
        root
    }

    /// Look a set up by root.
    pub fn get(&self, root: &Hash256) -> Option<TxSet> {
        self.sets.read().get(root).cloned()
    }

    /// Do we know this root?
    pub fn contains(&self, root: &Hash256) -> bool {
        self.sets.read().contains_key(root)
    }
}

// ---------------------------------------------------------------------------
// Events, phases, errors
// ---------------------------------------------------------------------------

/// The driver's externally visible phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Accumulating transactions, waiting for the close trigger.
    Open,
    /// Exchanging positions, converging on a set and close time.
    Establish,
    /// Applying the agreed set and signing our validation.
    Accepted,
    /// Waiting for the validation quorum.
    Processing,
    /// A fatal error stopped the machine. Terminal.
    Halted,
}

/// Externally visible effects of a tick, for the overlay to act on.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// Broadcast our position.
    Propose(Proposal),
    /// Broadcast our validation.
    Validate(Validation),
    /// We built a candidate ledger (not yet validated by the network).
    LedgerClosed { ledger: Arc<Ledger> },
    /// The last closed ledger advanced.
    LclAdvanced { ledger: Arc<Ledger> },
    /// Ask peers for a ledger we do not hold.
    Acquire { hash: Hash256, seq: u32 },
    /// We abandoned the round at this sequence; the network moved on.
    RoundAbandoned { seq: u32 },
}

/// Fatal driver failures. Everything recoverable is handled internally;
/// if one of these comes out, the driver has halted.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver cannot continue: storage failure, or an integrity
    /// failure on a ledger we built ourselves.
    #[error("consensus driver halted: {0}")]
    Fatal(String),
}

/// A transaction whose inclusion the round is voting on.
#[derive(Debug, Clone)]
struct DisputedTx {
    blob: Vec<u8>,
    our_vote: bool,
}

// ---------------------------------------------------------------------------
// RoundDriver
// ---------------------------------------------------------------------------

/// The consensus round driver. See the module docs for the state machine.
pub struct RoundDriver {
    config: DriverConfig,
    keypair: PulsarKeypair,
    ctx: CoreContext,

    phase: RoundPhase,
    parent: Arc<Ledger>,
    resolution: u32,

    round_started_ms: u64,
    establish_started_ms: u64,
    last_broadcast_ms: u64,

    /// How long the previous round took to agree; paces this one.
    prev_round_ms: u64,
    /// Proposers seen in the previous round.
    prev_proposers: usize,
    /// Did the previous round agree on a close time? Tunes resolution.
    prev_close_agreed: bool,

    proposer_seq: u32,
    position: Option<TxSet>,
    close_vote: u64,
    disputes: HashMap<Hash256, DisputedTx>,
    stuck_escalated: bool,

    candidate: Option<Arc<Ledger>>,
    /// A network ledger we are waiting to fetch before adopting.
    adopt_target: Option<(Hash256, u32)>,

    stopped: AtomicBool,
}

impl RoundDriver {
    /// Create a driver starting a fresh round on the history's LCL.
    pub fn new(config: DriverConfig, keypair: PulsarKeypair, ctx: CoreContext) -> Self {
        let parent = ctx.history.lcl();
        let now = ctx.clock.monotonic_ms();
        let resolution = parent.header.close_time_resolution;

        info!(
            parent_seq = parent.seq(),
            resolution,
            "round driver initialized"
        );

        Self {
            config,
            keypair,
            ctx,
            phase: RoundPhase::Open,
            parent,
            resolution,
            round_started_ms: now,
            establish_started_ms: now,
            last_broadcast_ms: 0,
            prev_round_ms: 0,
            prev_proposers: 0,
            prev_close_agreed: true,
            proposer_seq: 0,
            position: None,
            close_vote: 0,
            disputes: HashMap::new(),
            stuck_escalated: false,
            candidate: None,
            adopt_target: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// The ledger this round builds on.
    pub fn parent(&self) -> Arc<Ledger> {
        Arc::clone(&self.parent)
    }

    /// The close-time resolution in force this round.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Request a stop. Idempotent; cascades to the acquirer. The next
    /// tick is a no-op.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("round driver stopping");
        self.ctx.acquirer.stop();
    }

    /// Has `stop` been called?
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance the state machine by one granule.
    ///
    /// Returns the events the overlay should act on. A `Err` is fatal:
    /// the driver is `Halted` and will stay that way.
    pub fn tick(&mut self) -> Result<Vec<ConsensusEvent>, DriverError> {
        if self.is_stopped() || self.phase == RoundPhase::Halted {
            return Ok(Vec::new());
        }

        // Housekeeping first, so every phase sees fresh stores.
        self.ctx.positions.sweep();
        self.ctx.validations.sweep();
        self.ctx.acquirer.sweep();

        let mut events = Vec::new();
        let result = match self.phase {
            RoundPhase::Open => {
                self.tick_open(&mut events);
                Ok(())
            }
            RoundPhase::Establish => self.tick_establish(&mut events),
            RoundPhase::Processing => {
                self.tick_processing(&mut events);
                Ok(())
            }
            // Accepted is transient inside a tick; if we observe it here,
            // the previous tick failed mid-transition and halted.
            RoundPhase::Accepted | RoundPhase::Halted => Ok(()),
        };

        if let Err(e) = result {
            error!(error = %e, "fatal consensus error, halting driver");
            self.phase = RoundPhase::Halted;
            return Err(e);
        }

        Ok(events)
    }

    // -----------------------------------------------------------------------
    // Open
    // -----------------------------------------------------------------------

    fn tick_open(&mut self, events: &mut Vec<ConsensusEvent>) {
        let now = self.ctx.clock.monotonic_ms();
        let open_set = self.ctx.applicator.open_snapshot();
        let parent_hash = self.parent.hash();

        let proposers_closed = self.ctx.positions.proposer_count(&parent_hash);
        let proposers_validated = self
            .ctx
            .validations
            .trusted_validating_at(self.parent.seq() + 1);
        let open_ms = now.saturating_sub(self.round_started_ms);

        if !should_close_ledger(
            !open_set.is_empty(),
            self.prev_proposers,
            proposers_closed,
            proposers_validated,
            self.prev_round_ms,
            open_ms,
            open_ms,
            self.config.idle_interval_secs,
        ) {
            return;
        }

        // Take our initial position: the open set as it stands, and the
        // wall clock rounded to this round's resolution.
        self.ctx.tx_sets.insert(open_set.clone());
        self.position = Some(open_set);
        self.close_vote = round_close_time(self.ctx.clock.wall_secs(), self.resolution);
        self.proposer_seq = 0;
        self.establish_started_ms = now;
        self.phase = RoundPhase::Establish;

        debug!(
            parent_seq = self.parent.seq(),
            txs = self.position.as_ref().map(|s| s.len()).unwrap_or(0),
            close_vote = self.close_vote,
            "ledger closed, entering establish"
        );
        self.broadcast(events, now);
    }

    // -----------------------------------------------------------------------
    // Establish
    // -----------------------------------------------------------------------

    fn tick_establish(&mut self, events: &mut Vec<ConsensusEvent>) -> Result<(), DriverError> {
        let now = self.ctx.clock.monotonic_ms();
        let elapsed = now.saturating_sub(self.establish_started_ms);
        let proposals = self.ctx.positions.current_proposals(&self.parent.hash());
        let cur_proposers = proposals.len();

        self.update_disputes(&proposals);

        let mut threshold = avalanche_threshold(elapsed, self.prev_round_ms);
        if self.stuck_escalated {
            threshold = AV_STUCK_CONSENSUS_PCT;
        }

        let position_changed = self.revote(&proposals, threshold);
        let close_changed = self.revote_close_time(&proposals);

        if position_changed || close_changed {
            self.proposer_seq += 1;
            self.broadcast(events, now);
        } else if now.saturating_sub(self.last_broadcast_ms)
            >= self.config.propose_interval_secs * 1_000
        {
            // Nothing new to say, but late joiners need to hear it anyway.
            self.broadcast(events, now);
        }

        let our_root = self
            .position
            .as_ref()
            .expect("establish phase always has a position")
            .root();
        let cur_agree = proposals
            .iter()
            .filter(|p| p.tx_set_root == our_root)
            .count();
        let cur_finished = self
            .ctx
            .validations
            .trusted_validating_at(self.parent.seq() + 1);

        match check_consensus(
            self.prev_proposers,
            cur_proposers,
            cur_agree,
            cur_finished,
            self.prev_round_ms,
            elapsed,
        ) {
            ConsensusOutcome::Yes => {
                let close_agreed = self.close_time_agreed(&proposals, threshold);
                self.enter_accepted(events, close_agreed, cur_proposers, elapsed)?;
            }
            ConsensusOutcome::MovedOn => {
                self.handle_moved_on(events, cur_proposers);
            }
            ConsensusOutcome::No => {
                // Not there yet. If the avalanche schedule has reached the
                // stuck threshold, give it exactly one escalated tick and
                // then close with whatever survived the 95% filter.
                if avalanche_threshold(elapsed, self.prev_round_ms) == AV_STUCK_CONSENSUS_PCT {
                    if !self.stuck_escalated {
                        warn!(
                            elapsed_ms = elapsed,
                            "round is stuck, escalating dispute threshold"
                        );
                        self.stuck_escalated = true;
                    } else {
                        warn!(
                            elapsed_ms = elapsed,
                            "round failed to converge, closing with agreed remainder"
                        );
                        self.enter_accepted(events, false, cur_proposers, elapsed)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Rebuild the dispute table from the latest peer positions. A
    /// dispute exists per transaction that some known peer set and our
    /// position disagree about.
    fn update_disputes(&mut self, proposals: &[Proposal]) {
        let Some(ours) = self.position.as_ref() else {
            return;
        };
        let our_root = ours.root();

        for proposal in proposals {
            if proposal.tx_set_root == our_root {
                continue;
            }
            let Some(theirs) = self.ctx.tx_sets.get(&proposal.tx_set_root) else {
                // We only know this position by root so far; nothing to
                // dispute until the set body arrives.
                continue;
            };
            for (id, in_ours) in ours.differences(&theirs) {
                self.disputes.entry(id).or_insert_with(|| {
                    let blob = if in_ours { ours.get(&id) } else { theirs.get(&id) }
                        .expect("a differing tx exists on exactly one side")
                        .to_vec();
                    DisputedTx {
                        blob,
                        our_vote: in_ours,
                    }
                });
            }
        }
    }

    /// Re-vote every dispute against the current threshold. Returns true
    /// if our position changed.
    fn revote(&mut self, proposals: &[Proposal], threshold: u32) -> bool {
        let peer_sets: Vec<Option<TxSet>> = proposals
            .iter()
            .map(|p| self.ctx.tx_sets.get(&p.tx_set_root))
            .collect();
        let position = self
            .position
            .as_mut()
            .expect("establish phase always has a position");

        let total = proposals.len() + 1;
        let mut changed = false;

        for (id, dispute) in self.disputes.iter_mut() {
            let mut yes = peer_sets
                .iter()
                .flatten()
                .filter(|set| set.contains(id))
                .count();
            if dispute.our_vote {
                yes += 1;
            }

            let include = yes * 100 >= threshold as usize * total;
            if include != dispute.our_vote {
                debug!(
                    tx = %hex::encode(id),
                    include,
                    yes,
                    total,
                    threshold,
                    "dispute vote flipped"
                );
                dispute.our_vote = include;
                changed = true;
                if include {
                    position.insert_raw(*id, dispute.blob.clone());
                } else {
                    position.remove(id);
                }
            }
        }

        changed
    }

    /// Converge our close-time vote on the mode of peer votes within the
    /// current resolution, tie-broken toward our previous vote. Returns
    /// true if the vote moved.
    fn revote_close_time(&mut self, proposals: &[Proposal]) -> bool {
        if proposals.is_empty() {
            return false;
        }

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for proposal in proposals {
            *counts
                .entry(round_close_time(proposal.close_time, self.resolution))
                .or_insert(0) += 1;
        }
        *counts.entry(self.close_vote).or_insert(0) += 1;

        let ours = self.close_vote;
        let best = counts
            .into_iter()
            .max_by(|(time_a, count_a), (time_b, count_b)| {
                count_a
                    .cmp(count_b)
                    .then_with(|| (*time_a == ours).cmp(&(*time_b == ours)))
                    // Deterministic final tie-break: prefer the smaller time.
                    .then_with(|| time_b.cmp(time_a))
            })
            .map(|(time, _)| time)
            .unwrap_or(ours);

        if best != self.close_vote {
            self.close_vote = best;
            return true;
        }
        false
    }

    /// Do enough participants share our close-time vote?
    fn close_time_agreed(&self, proposals: &[Proposal], threshold: u32) -> bool {
        let agree = proposals
            .iter()
            .filter(|p| round_close_time(p.close_time, self.resolution) == self.close_vote)
            .count()
            + 1;
        agree * 100 >= threshold as usize * (proposals.len() + 1)
    }

    /// Sign and emit our current position. The set body goes into the
    /// cache so peers asking for our root by hash can be answered.
    fn broadcast(&mut self, events: &mut Vec<ConsensusEvent>, now: u64) {
        let position = self
            .position
            .as_ref()
            .expect("broadcast requires a position");
        let root = self.ctx.tx_sets.insert(position.clone());
        let proposal = Proposal::new(
            &self.keypair,
            self.parent.hash(),
            root,
            self.close_vote,
            self.proposer_seq,
        );
        self.ctx.positions.set_local(proposal.clone());
        self.last_broadcast_ms = now;
        events.push(ConsensusEvent::Propose(proposal));
    }

    // -----------------------------------------------------------------------
    // Accepted
    // -----------------------------------------------------------------------

    /// Apply the agreed set, build and persist the candidate ledger, and
    /// emit our validation. Fatal on apply, integrity, or store failure.
    fn enter_accepted(
        &mut self,
        events: &mut Vec<ConsensusEvent>,
        close_agreed: bool,
        cur_proposers: usize,
        elapsed_ms: u64,
    ) -> Result<(), DriverError> {
        self.phase = RoundPhase::Accepted;
        let set = self
            .position
            .clone()
            .expect("accepted phase always has a position");

        let outcome = self
            .ctx
            .applicator
            .apply(&self.parent.header, &set)
            .map_err(|e| DriverError::Fatal(e.to_string()))?;

        let close_flags = if close_agreed {
            0
        } else {
            CLOSE_FLAG_NO_CONSENSUS_TIME
        };
        let close_time = effective_close_time(
            self.close_vote,
            self.resolution,
            self.parent.header.close_time,
        );

        let ledger = Ledger::close(
            &self.parent.header,
            outcome.tx_set_root,
            set.ids(),
            outcome.state_root,
            close_time,
            self.resolution,
            close_flags,
        );
        // We built this ledger ourselves; if it does not verify, our own
        // state is corrupt and continuing would sign garbage.
        ledger.verify().map_err(DriverError::Fatal)?;

        let bytes = bincode::serialize(&ledger)
            .map_err(|e| DriverError::Fatal(format!("ledger serialization failed: {e}")))?;
        self.ctx
            .store
            .store(NodeObject {
                hash: ledger.hash(),
                data: bytes,
            })
            .map_err(|e| DriverError::Fatal(e.to_string()))?;

        let shared = self.ctx.history.insert(ledger);
        let validation = Validation::full(
            &self.keypair,
            shared.hash(),
            shared.seq(),
            self.ctx.clock.wall_secs(),
        );
        self.ctx.validations.insert(validation.clone());
        self.ctx.applicator.prune_open(&set);

        info!(
            seq = shared.seq(),
            hash = %hex::encode(shared.hash()),
            txs = set.len(),
            close_agreed,
            round_ms = elapsed_ms,
            "candidate ledger built and validated"
        );

        events.push(ConsensusEvent::Validate(validation));
        events.push(ConsensusEvent::LedgerClosed {
            ledger: Arc::clone(&shared),
        });

        self.candidate = Some(shared);
        self.prev_round_ms = elapsed_ms.max(LEDGER_GRANULARITY.as_millis() as u64);
        self.prev_proposers = cur_proposers;
        self.prev_close_agreed = close_agreed;
        self.phase = RoundPhase::Processing;
        Ok(())
    }

    /// The network finished this round without us. Stop proposing, find
    /// the prevailing ledger, and chase it.
    fn handle_moved_on(&mut self, events: &mut Vec<ConsensusEvent>, cur_proposers: usize) {
        let abandoned_seq = self.parent.seq() + 1;
        warn!(seq = abandoned_seq, "network moved on without us, abandoning round");
        events.push(ConsensusEvent::RoundAbandoned { seq: abandoned_seq });

        self.prev_proposers = cur_proposers;
        self.prev_close_agreed = false;
        self.candidate = None;

        match self.ctx.validations.best_validated_ledger() {
            Some((hash, seq)) if hash != self.parent.hash() => {
                if self.ctx.history.contains(&hash) {
                    if let Some(ledger) = self.ctx.history.set_lcl(&hash) {
                        events.push(ConsensusEvent::LclAdvanced {
                            ledger: Arc::clone(&ledger),
                        });
                        self.start_round(ledger);
                        return;
                    }
                }
                self.ctx.acquirer.acquire(hash, seq, AcquireReason::Consensus);
                events.push(ConsensusEvent::Acquire { hash, seq });
                self.adopt_target = Some((hash, seq));
                self.phase = RoundPhase::Processing;
            }
            _ => {
                // No better ledger visible yet; restart the round and let
                // the validation store fill in.
                let parent = Arc::clone(&self.parent);
                self.start_round(parent);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    fn tick_processing(&mut self, events: &mut Vec<ConsensusEvent>) {
        // Acquirer completions were inserted into the history already;
        // draining the queue here keeps it bounded.
        let _ = self.ctx.acquirer.take_completed();

        if let Some((hash, seq)) = self.adopt_target {
            if let Some(ledger) = self.ctx.history.set_lcl(&hash) {
                events.push(ConsensusEvent::LclAdvanced {
                    ledger: Arc::clone(&ledger),
                });
                self.adopt_target = None;
                self.start_round(ledger);
            } else if self.ctx.acquirer.is_failure(&hash) {
                warn!(
                    hash = %hex::encode(hash),
                    seq,
                    "could not fetch the network's ledger, restarting from our LCL"
                );
                self.adopt_target = None;
                let lcl = self.ctx.history.lcl();
                self.start_round(lcl);
            }
            return;
        }

        let Some(candidate) = self.candidate.clone() else {
            // Nothing to wait for; re-open on the current LCL.
            let lcl = self.ctx.history.lcl();
            self.start_round(lcl);
            return;
        };

        let weights = self.ctx.validations.trusted_for(candidate.seq());
        let quorum = self.ctx.unl.quorum();
        if quorum == 0 {
            return;
        }

        if weights.get(&candidate.hash()).copied().unwrap_or(0) >= quorum {
            if let Some(ledger) = self.ctx.history.set_lcl(&candidate.hash()) {
                events.push(ConsensusEvent::LclAdvanced {
                    ledger: Arc::clone(&ledger),
                });
                self.candidate = None;
                self.start_round(ledger);
            }
            return;
        }

        // A competitor at quorum wins; fetch it if we don't hold it.
        let competitor = weights
            .into_iter()
            .filter(|(hash, weight)| *weight >= quorum && *hash != candidate.hash())
            .min_by(|(hash_a, w_a), (hash_b, w_b)| w_b.cmp(w_a).then(hash_a.cmp(hash_b)))
            .map(|(hash, _)| hash);

        if let Some(hash) = competitor {
            let seq = candidate.seq();
            warn!(
                ours = %hex::encode(candidate.hash()),
                theirs = %hex::encode(hash),
                seq,
                "network validated a competing ledger"
            );
            if let Some(ledger) = self.ctx.history.set_lcl(&hash) {
                events.push(ConsensusEvent::LclAdvanced {
                    ledger: Arc::clone(&ledger),
                });
                self.candidate = None;
                self.start_round(ledger);
            } else {
                self.ctx.acquirer.acquire(hash, seq, AcquireReason::Consensus);
                events.push(ConsensusEvent::Acquire { hash, seq });
                self.candidate = None;
                self.adopt_target = Some((hash, seq));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Round rollover
    // -----------------------------------------------------------------------

    /// Reset per-round state and open the next round on `parent`.
    fn start_round(&mut self, parent: Arc<Ledger>) {
        let now = self.ctx.clock.monotonic_ms();
        self.resolution = next_time_resolution(
            parent.header.close_time_resolution,
            self.prev_close_agreed,
            parent.seq() + 1,
        );

        debug!(
            parent_seq = parent.seq(),
            resolution = self.resolution,
            "opening next round"
        );

        self.parent = parent;
        self.phase = RoundPhase::Open;
        self.round_started_ms = now;
        self.establish_started_ms = now;
        self.proposer_seq = 0;
        self.position = None;
        self.close_vote = 0;
        self.disputes.clear();
        self.stuck_escalated = false;
        self.candidate = None;
        self.adopt_target = None;
        self.ctx.positions.clear_local();
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Run the driver until shutdown, ticking once per granule.
    ///
    /// Events are pushed into `events_tx` for the overlay to broadcast.
    /// Returns `Ok(())` on clean shutdown and the fatal error if the
    /// state machine halted.
    pub async fn run(
        &mut self,
        events_tx: mpsc::UnboundedSender<ConsensusEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DriverError> {
        info!("round driver starting");
        let mut ticker = tokio::time::interval(LEDGER_GRANULARITY);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() || self.is_stopped() {
                info!("round driver shut down cleanly");
                return Ok(());
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let events = self.tick()?;
                    for event in events {
                        if events_tx.send(event).is_err() {
                            // Nobody is listening anymore; treat as shutdown.
                            return Ok(());
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("round driver received shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
