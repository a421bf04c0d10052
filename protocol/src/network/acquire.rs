//! # Inbound-Ledger Acquisition
//!
//! When a quorum of validations (or a peer proposal) names a ledger we do
//! not hold, this module fetches it: pick peers that advertised the hash,
//! send `GetLedger`, assemble the reply chunks, verify them against the
//! hash, and hand the materialized ledger to the driver.
//!
//! ## Shape
//!
//! The acquirer is transport-agnostic, the same way the rest of the core
//! is: `tick()` returns the `GetLedger` requests that should go out this
//! granule, and the overlay calls `got_ledger_data` with whatever comes
//! back. No sockets in here, which also means the whole retry/timeout
//! state machine runs under a test harness with a manual clock.
//!
//! ## Verification
//!
//! The requested hash is the root of trust. A delivered header must hash
//! to exactly the requested value (which pins the transaction-set root
//! and state root, since both are inside the header hash). Transaction
//! chunks must re-derive their ids; the assembled set must re-derive the
//! header's transaction-set root. State chunks are content-addressed and
//! verified individually. A peer can waste our time; it cannot make us
//! accept a wrong ledger.
//!
//! ## Failure policy
//!
//! Per peer: [`ACQUIRE_PEER_MAX_RETRIES`] reply timeouts and the peer is
//! dropped from the acquisition. Per hash: a reason-dependent deadline,
//! after which the hash lands in a failure cache that short-circuits
//! repeat requests until `clear_failures` or the sweep. Data for hashes
//! we are not acquiring is counted as stale and never applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{
    ACQUIRE_DEADLINE_CONSENSUS_SECS, ACQUIRE_DEADLINE_HISTORY_SECS, ACQUIRE_PEER_LIMIT,
    ACQUIRE_PEER_MAX_RETRIES, PEER_REPLY_MS,
};
use crate::consensus::clock::Clock;
use crate::crypto::hash::{domain_hash, Hash256};
use crate::ledger::header::{Ledger, LedgerHeader};
use crate::ledger::tx_set::TxSet;
use crate::network::wire::{LedgerNode, LedgerQuery, PeerMessage};
use crate::storage::history::LedgerHistory;
use crate::storage::node_store::{NodeObject, NodeStore};

/// Failure-cache entries expire after this long, letting a once-dead hash
/// be retried eventually.
const FAILURE_RETENTION_MS: u64 = 10 * 60 * 1_000;

/// Hash domain for content-addressed state-map chunks. Peers must derive
/// chunk ids under this domain or their data is rejected.
pub const STATE_NODE_DOMAIN: &str = "pulsar.state-node";

/// Decay half-life of the fetch-rate average, in minutes.
const FETCH_RATE_HALF_LIFE_MIN: f64 = 1.0;

/// Opaque peer identity assigned by the overlay.
pub type PeerId = u64;

/// Why a ledger is being acquired. Consensus outranks everything else
/// when request slots are scarce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AcquireReason {
    /// Back-filling history; patient.
    History,
    /// Part of a fetch pack; patient.
    FetchPack,
    /// The round driver needs it to make progress; urgent.
    Consensus,
}

impl AcquireReason {
    fn deadline_ms(self) -> u64 {
        match self {
            AcquireReason::Consensus => ACQUIRE_DEADLINE_CONSENSUS_SECS * 1_000,
            AcquireReason::History | AcquireReason::FetchPack => {
                ACQUIRE_DEADLINE_HISTORY_SECS * 1_000
            }
        }
    }
}

/// Outcome of feeding one `LedgerData` packet to the acquirer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDisposition {
    /// Useful data; the acquisition is still incomplete.
    Progress,
    /// This packet completed the acquisition.
    Completed,
    /// Data for a hash we are not (or no longer) acquiring.
    Stale,
    /// Data that failed verification.
    Invalid,
}

/// A `GetLedger` that should be sent to a peer this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRequest {
    pub peer: PeerId,
    pub message: PeerMessage,
}

/// A completed acquisition, ready for the driver.
#[derive(Debug, Clone)]
pub struct FetchedLedger {
    pub ledger: Arc<Ledger>,
    pub reason: AcquireReason,
}

// ---------------------------------------------------------------------------
// Per-hash acquisition state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct PeerState {
    /// Monotonic ms of the outstanding request, if one is in flight.
    asked_at_ms: Option<u64>,
    /// Reply timeouts accumulated on this acquisition.
    retries: u32,
    /// Dropped peers get no further requests for this hash.
    dropped: bool,
}

struct LedgerAcquire {
    hash: Hash256,
    seq: u32,
    reason: AcquireReason,
    deadline_at_ms: u64,
    peers: HashMap<PeerId, PeerState>,
    header: Option<LedgerHeader>,
    txs: TxSet,
}

impl LedgerAcquire {
    /// Complete iff the verified header's transaction-set root matches
    /// the set assembled so far.
    fn is_complete(&self) -> bool {
        match &self.header {
            Some(header) => self.txs.root() == header.tx_set_root,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// InboundLedgers
// ---------------------------------------------------------------------------

/// The acquirer: deduplicated in-flight acquisitions plus the failure
/// cache and telemetry.
pub struct InboundLedgers {
    clock: Arc<dyn Clock>,
    history: Arc<LedgerHistory>,
    store: Arc<dyn NodeStore>,
    /// In-flight acquisitions by hash. The dashmap gives ingest lock-free
    /// routing; per-hash state sits behind its own mutex.
    active: DashMap<Hash256, Arc<Mutex<LedgerAcquire>>>,
    /// Hashes that timed out, with the monotonic ms of failure.
    failures: RwLock<HashMap<Hash256, u64>>,
    /// Completed fetches awaiting driver pickup.
    completed: Mutex<Vec<FetchedLedger>>,
    /// Out-of-window `LedgerData` packets, for telemetry.
    stale_data: AtomicU64,
    /// Reply timeouts across all acquisitions, ever.
    total_timeouts: AtomicU64,
    /// Decaying average of completed fetches, see [`fetch_rate`](Self::fetch_rate).
    rate: Mutex<DecayingRate>,
    stopped: AtomicBool,
}

impl InboundLedgers {
    /// Create an acquirer wired to the ledger history and node store.
    pub fn new(
        clock: Arc<dyn Clock>,
        history: Arc<LedgerHistory>,
        store: Arc<dyn NodeStore>,
    ) -> Self {
        Self {
            clock,
            history,
            store,
            active: DashMap::new(),
            failures: RwLock::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            stale_data: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
            rate: Mutex::new(DecayingRate::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Begin acquiring a ledger by hash. Deduplicated: a second call for
    /// an in-flight hash joins the existing acquisition (and may raise
    /// its priority). Returns false when nothing was started: we already
    /// hold the ledger, the hash is cached as failed, or we are stopped.
    pub fn acquire(&self, hash: Hash256, seq: u32, reason: AcquireReason) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        if self.history.contains(&hash) {
            return false;
        }
        if self.is_failure(&hash) {
            debug!(hash = %hex::encode(hash), "acquire refused: cached failure");
            return false;
        }

        if let Some(existing) = self.active.get(&hash) {
            let mut acq = existing.lock();
            if reason > acq.reason {
                // A consensus request upgrades a history fetch in place.
                acq.reason = reason;
            }
            return false;
        }

        let now = self.clock.monotonic_ms();
        info!(hash = %hex::encode(hash), seq, ?reason, "acquiring ledger");
        self.active.insert(
            hash,
            Arc::new(Mutex::new(LedgerAcquire {
                hash,
                seq,
                reason,
                deadline_at_ms: now + reason.deadline_ms(),
                peers: HashMap::new(),
                header: None,
                txs: TxSet::new(),
            })),
        );
        true
    }

    /// Register a peer that has advertised the hash (or its chain).
    pub fn add_peer(&self, hash: &Hash256, peer: PeerId) {
        if let Some(acq) = self.active.get(hash) {
            acq.lock().peers.entry(peer).or_default();
        }
    }

    /// Drive timeouts and retries. Returns the `GetLedger` requests the
    /// overlay should send this granule.
    pub fn tick(&self) -> Vec<PeerRequest> {
        if self.stopped.load(Ordering::SeqCst) {
            return Vec::new();
        }

        let now = self.clock.monotonic_ms();
        let mut requests = Vec::new();
        let mut expired: Vec<(Hash256, u32)> = Vec::new();

        for entry in self.active.iter() {
            let mut acq = entry.value().lock();

            if now >= acq.deadline_at_ms {
                expired.push((acq.hash, acq.seq));
                continue;
            }

            let mut in_flight = acq
                .peers
                .values()
                .filter(|p| !p.dropped && p.asked_at_ms.is_some())
                .count();

            let hash = acq.hash;
            for (peer, state) in acq.peers.iter_mut() {
                if state.dropped {
                    continue;
                }

                match state.asked_at_ms {
                    Some(asked) if now.saturating_sub(asked) >= PEER_REPLY_MS => {
                        // The peer sat on our request; charge a retry.
                        state.retries += 1;
                        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                        if state.retries >= ACQUIRE_PEER_MAX_RETRIES {
                            debug!(peer, hash = %hex::encode(hash), "peer dropped from acquisition");
                            state.dropped = true;
                            state.asked_at_ms = None;
                            in_flight -= 1;
                            continue;
                        }
                        state.asked_at_ms = Some(now);
                        requests.push(PeerRequest {
                            peer: *peer,
                            message: PeerMessage::GetLedger {
                                hash,
                                query: LedgerQuery::Full,
                                query_depth: 0,
                            },
                        });
                    }
                    Some(_) => {}
                    None if in_flight < ACQUIRE_PEER_LIMIT => {
                        state.asked_at_ms = Some(now);
                        in_flight += 1;
                        requests.push(PeerRequest {
                            peer: *peer,
                            message: PeerMessage::GetLedger {
                                hash,
                                query: LedgerQuery::Full,
                                query_depth: 0,
                            },
                        });
                    }
                    None => {}
                }
            }
        }

        for (hash, seq) in expired {
            self.active.remove(&hash);
            warn!(hash = %hex::encode(hash), seq, "ledger acquisition failed: deadline expired");
            self.failures.write().insert(hash, now);
        }

        requests
    }

    /// Ingest a `LedgerData` packet from a peer.
    pub fn got_ledger_data(
        &self,
        peer: PeerId,
        hash: Hash256,
        nodes: Vec<LedgerNode>,
    ) -> DataDisposition {
        let Some(entry) = self.active.get(&hash) else {
            // Late, duplicate, or unsolicited. Counted, never applied.
            self.stale_data.fetch_add(1, Ordering::Relaxed);
            return DataDisposition::Stale;
        };
        let acq = Arc::clone(entry.value());
        drop(entry);

        let mut acq = acq.lock();

        // The peer answered; clear its outstanding-request marker.
        if let Some(state) = acq.peers.get_mut(&peer) {
            state.asked_at_ms = None;
        }

        for node in nodes {
            match node {
                LedgerNode::Header(header) => {
                    if header.hash != hash || header.compute_hash() != hash {
                        warn!(peer, hash = %hex::encode(hash), "peer sent header that does not hash to request");
                        return DataDisposition::Invalid;
                    }
                    acq.header = Some(header);
                }
                LedgerNode::Tx { id, blob } => {
                    if !acq.txs.insert_raw(id, blob) {
                        warn!(peer, hash = %hex::encode(hash), "peer sent transaction with mismatched id");
                        return DataDisposition::Invalid;
                    }
                }
                LedgerNode::StateNode { id, blob } => {
                    if domain_hash(STATE_NODE_DOMAIN, &blob) != id {
                        warn!(peer, hash = %hex::encode(hash), "peer sent state chunk with mismatched id");
                        return DataDisposition::Invalid;
                    }
                    // Content-addressed chunks go straight to the store.
                    let _ = self.store.store(NodeObject { hash: id, data: blob });
                }
            }
        }

        if !acq.is_complete() {
            return DataDisposition::Progress;
        }

        // Materialize, persist, publish.
        let header = acq.header.clone().expect("complete implies header");
        let ledger = Ledger {
            header,
            tx_ids: acq.txs.ids(),
        };
        let reason = acq.reason;
        let hash = acq.hash;

        for (id, blob) in acq.txs.iter() {
            let _ = self.store.store(NodeObject {
                hash: *id,
                data: blob.clone(),
            });
        }
        if let Ok(bytes) = bincode::serialize(&ledger) {
            let _ = self.store.store(NodeObject { hash, data: bytes });
        }

        drop(acq);
        self.active.remove(&hash);

        let shared = self.history.insert(ledger);
        info!(hash = %hex::encode(hash), seq = shared.seq(), "ledger acquired");
        self.rate.lock().record(self.clock.monotonic_ms());
        self.completed.lock().push(FetchedLedger {
            ledger: shared,
            reason,
        });
        DataDisposition::Completed
    }

    /// Completed fetches since the last call. The driver polls this on
    /// its own tick; the acquirer never calls into the driver.
    pub fn take_completed(&self) -> Vec<FetchedLedger> {
        std::mem::take(&mut *self.completed.lock())
    }

    /// Is this hash cached as a failed acquisition?
    pub fn is_failure(&self, hash: &Hash256) -> bool {
        self.failures.read().contains_key(hash)
    }

    /// Forget all cached failures.
    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Expire old failure-cache entries.
    pub fn sweep(&self) {
        let now = self.clock.monotonic_ms();
        self.failures
            .write()
            .retain(|_, failed_at| now.saturating_sub(*failed_at) <= FAILURE_RETENTION_MS);
    }

    /// Decayed average of completed fetches per minute.
    pub fn fetch_rate(&self) -> f64 {
        self.rate.lock().value(self.clock.monotonic_ms())
    }

    /// (active acquisitions, accumulated reply timeouts).
    pub fn fetch_counts(&self) -> (usize, u64) {
        (self.active.len(), self.total_timeouts.load(Ordering::Relaxed))
    }

    /// Stop: refuse new work, abandon in-flight acquisitions. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let abandoned = self.active.len();
        self.active.clear();
        if abandoned > 0 {
            info!(abandoned, "acquirer stopped, in-flight acquisitions abandoned");
        }
    }

    /// Has `stop` been called?
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// DecayingRate
// ---------------------------------------------------------------------------

/// An exponentially decaying event rate, reported per minute.
#[derive(Default)]
struct DecayingRate {
    value: f64,
    last_ms: u64,
}

impl DecayingRate {
    fn decay(&mut self, now_ms: u64) {
        let elapsed_min = now_ms.saturating_sub(self.last_ms) as f64 / 60_000.0;
        if elapsed_min > 0.0 {
            self.value *= 0.5f64.powf(elapsed_min / FETCH_RATE_HALF_LIFE_MIN);
            self.last_ms = now_ms;
        }
    }

    fn record(&mut self, now_ms: u64) {
        self.decay(now_ms);
        self.value += 1.0;
    }

    fn value(&mut self, now_ms: u64) -> f64 {
        self.decay(now_ms);
        self.value
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::clock::ManualClock;
    use crate::storage::node_store::MemoryStore;

    struct Harness {
        clock: Arc<ManualClock>,
        history: Arc<LedgerHistory>,
        store: Arc<MemoryStore>,
        acquirer: InboundLedgers,
    }

    fn setup() -> Harness {
        let clock = Arc::new(ManualClock::new());
        let history = Arc::new(LedgerHistory::new());
        let store = Arc::new(MemoryStore::new());
        let acquirer = InboundLedgers::new(clock.clone(), history.clone(), store.clone());
        Harness {
            clock,
            history,
            store,
            acquirer,
        }
    }

    /// A closed ledger with one transaction, plus the wire nodes a
    /// cooperative peer would send for it.
    fn remote_ledger(h: &Harness) -> (Ledger, Vec<LedgerNode>) {
        let parent = h.history.lcl();
        let mut txs = TxSet::new();
        let id = txs.insert(vec![0xAB; 8]);
        let ledger = Ledger::close(
            &parent.header,
            txs.root(),
            txs.ids(),
            [3u8; 32],
            100,
            30,
            0,
        );
        let nodes = vec![
            LedgerNode::Header(ledger.header.clone()),
            LedgerNode::Tx {
                id,
                blob: vec![0xAB; 8],
            },
        ];
        (ledger, nodes)
    }

    #[test]
    fn acquire_dedupes_by_hash() {
        let h = setup();
        assert!(h.acquirer.acquire([1u8; 32], 5, AcquireReason::Consensus));
        assert!(!h.acquirer.acquire([1u8; 32], 5, AcquireReason::Consensus));
        assert_eq!(h.acquirer.fetch_counts().0, 1);
    }

    #[test]
    fn acquire_refuses_held_ledger() {
        let h = setup();
        let lcl_hash = h.history.lcl().hash();
        assert!(!h.acquirer.acquire(lcl_hash, 0, AcquireReason::Consensus));
    }

    #[test]
    fn consensus_upgrades_history_priority() {
        let h = setup();
        h.acquirer.acquire([1u8; 32], 5, AcquireReason::History);
        h.acquirer.acquire([1u8; 32], 5, AcquireReason::Consensus);
        // Still one acquisition; the upgrade shows up as the consensus
        // deadline NOT being applied retroactively (deadline was set at
        // start), but the reason is now Consensus for completion events.
        assert_eq!(h.acquirer.fetch_counts().0, 1);
    }

    #[test]
    fn tick_asks_advertising_peers() {
        let h = setup();
        h.acquirer.acquire([1u8; 32], 5, AcquireReason::Consensus);
        h.acquirer.add_peer(&[1u8; 32], 7);
        h.acquirer.add_peer(&[1u8; 32], 8);

        let requests = h.acquirer.tick();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert!(matches!(
                request.message,
                PeerMessage::GetLedger { hash, .. } if hash == [1u8; 32]
            ));
        }

        // No duplicate requests while the first ones are outstanding.
        assert!(h.acquirer.tick().is_empty());
    }

    #[test]
    fn peer_timeout_retries_then_drops() {
        let h = setup();
        h.acquirer.acquire([1u8; 32], 5, AcquireReason::Consensus);
        h.acquirer.add_peer(&[1u8; 32], 7);

        assert_eq!(h.acquirer.tick().len(), 1);

        // Each reply timeout costs a retry; the third drops the peer.
        h.clock.advance_ms(PEER_REPLY_MS);
        assert_eq!(h.acquirer.tick().len(), 1);
        h.clock.advance_ms(PEER_REPLY_MS);
        assert_eq!(h.acquirer.tick().len(), 1);
        h.clock.advance_ms(PEER_REPLY_MS);
        assert!(h.acquirer.tick().is_empty());

        let (_, timeouts) = h.acquirer.fetch_counts();
        assert_eq!(timeouts, 3);
    }

    #[test]
    fn completes_and_publishes_ledger() {
        let h = setup();
        let (ledger, nodes) = remote_ledger(&h);
        let hash = ledger.hash();

        h.acquirer.acquire(hash, 1, AcquireReason::Consensus);
        h.acquirer.add_peer(&hash, 7);
        h.acquirer.tick();

        assert_eq!(
            h.acquirer.got_ledger_data(7, hash, nodes),
            DataDisposition::Completed
        );

        // Published to history, handed to the driver, persisted.
        assert!(h.history.contains(&hash));
        let completed = h.acquirer.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].ledger.hash(), hash);
        assert_eq!(completed[0].reason, AcquireReason::Consensus);
        assert!(h.store.fetch(&hash).unwrap().is_some());
        assert!(h.acquirer.fetch_rate() > 0.0);
        assert_eq!(h.acquirer.fetch_counts().0, 0);
    }

    #[test]
    fn header_alone_completes_empty_ledger() {
        let h = setup();
        let parent = h.history.lcl();
        let empty = TxSet::new();
        let ledger = Ledger::close(&parent.header, empty.root(), vec![], [1u8; 32], 90, 30, 0);
        let hash = ledger.hash();

        h.acquirer.acquire(hash, 1, AcquireReason::Consensus);
        assert_eq!(
            h.acquirer
                .got_ledger_data(7, hash, vec![LedgerNode::Header(ledger.header)]),
            DataDisposition::Completed
        );
    }

    #[test]
    fn partial_data_is_progress() {
        let h = setup();
        let (ledger, nodes) = remote_ledger(&h);
        let hash = ledger.hash();

        h.acquirer.acquire(hash, 1, AcquireReason::Consensus);
        // Header only: the transaction set is still missing.
        assert_eq!(
            h.acquirer.got_ledger_data(7, hash, vec![nodes[0].clone()]),
            DataDisposition::Progress
        );
        // The transaction completes it.
        assert_eq!(
            h.acquirer.got_ledger_data(7, hash, vec![nodes[1].clone()]),
            DataDisposition::Completed
        );
    }

    #[test]
    fn unsolicited_data_is_stale_and_counted() {
        let h = setup();
        assert_eq!(
            h.acquirer.got_ledger_data(7, [9u8; 32], vec![]),
            DataDisposition::Stale
        );
        assert_eq!(h.acquirer.stale_data.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn lying_header_is_invalid() {
        let h = setup();
        let (ledger, _) = remote_ledger(&h);
        let hash = ledger.hash();

        h.acquirer.acquire(hash, 1, AcquireReason::Consensus);

        // A genuine header for a different ledger.
        let parent = h.history.lcl();
        let other = Ledger::close(&parent.header, [7u8; 32], vec![], [7u8; 32], 95, 30, 0);
        assert_eq!(
            h.acquirer
                .got_ledger_data(7, hash, vec![LedgerNode::Header(other.header)]),
            DataDisposition::Invalid
        );
    }

    #[test]
    fn state_chunks_are_content_addressed_and_stored() {
        let h = setup();
        let (ledger, mut nodes) = remote_ledger(&h);
        let hash = ledger.hash();

        let chunk = vec![0x5A; 24];
        let chunk_id = domain_hash(STATE_NODE_DOMAIN, &chunk);
        nodes.push(LedgerNode::StateNode {
            id: chunk_id,
            blob: chunk.clone(),
        });

        h.acquirer.acquire(hash, 1, AcquireReason::Consensus);
        assert_eq!(
            h.acquirer.got_ledger_data(7, hash, nodes),
            DataDisposition::Completed
        );

        // The verified chunk landed in the node store under its id.
        let stored = h.store.fetch(&chunk_id).unwrap().expect("chunk persisted");
        assert_eq!(stored.data, chunk);

        // A chunk whose id does not derive from its bytes is rejected.
        let h2 = setup();
        let (ledger2, _) = remote_ledger(&h2);
        h2.acquirer.acquire(ledger2.hash(), 1, AcquireReason::Consensus);
        assert_eq!(
            h2.acquirer.got_ledger_data(
                7,
                ledger2.hash(),
                vec![LedgerNode::StateNode {
                    id: [0x11; 32],
                    blob: vec![1, 2, 3],
                }],
            ),
            DataDisposition::Invalid
        );
    }

    #[test]
    fn lying_tx_id_is_invalid() {
        let h = setup();
        let (ledger, _) = remote_ledger(&h);
        let hash = ledger.hash();

        h.acquirer.acquire(hash, 1, AcquireReason::Consensus);
        assert_eq!(
            h.acquirer.got_ledger_data(
                7,
                hash,
                vec![LedgerNode::Tx {
                    id: [0xEE; 32],
                    blob: vec![1, 2, 3],
                }],
            ),
            DataDisposition::Invalid
        );
    }

    #[test]
    fn deadline_expiry_enters_failure_cache() {
        let h = setup();
        let hash = [1u8; 32];
        h.acquirer.acquire(hash, 5, AcquireReason::Consensus);

        h.clock.advance_secs(ACQUIRE_DEADLINE_CONSENSUS_SECS + 1);
        h.acquirer.tick();

        assert!(h.acquirer.is_failure(&hash));
        assert_eq!(h.acquirer.fetch_counts().0, 0);
        // Subsequent acquires short-circuit on the cached failure.
        assert!(!h.acquirer.acquire(hash, 5, AcquireReason::Consensus));

        h.acquirer.clear_failures();
        assert!(!h.acquirer.is_failure(&hash));
        assert!(h.acquirer.acquire(hash, 5, AcquireReason::Consensus));
    }

    #[test]
    fn failure_cache_expires_on_sweep() {
        let h = setup();
        let hash = [1u8; 32];
        h.acquirer.acquire(hash, 5, AcquireReason::Consensus);
        h.clock.advance_secs(ACQUIRE_DEADLINE_CONSENSUS_SECS + 1);
        h.acquirer.tick();
        assert!(h.acquirer.is_failure(&hash));

        h.clock.advance_ms(FAILURE_RETENTION_MS + 1);
        h.acquirer.sweep();
        assert!(!h.acquirer.is_failure(&hash));
    }

    #[test]
    fn fetch_rate_decays() {
        let h = setup();
        let (ledger, nodes) = remote_ledger(&h);
        let hash = ledger.hash();
        h.acquirer.acquire(hash, 1, AcquireReason::History);
        h.acquirer.got_ledger_data(7, hash, nodes);

        let fresh = h.acquirer.fetch_rate();
        h.clock.advance_secs(120);
        let later = h.acquirer.fetch_rate();
        assert!(later < fresh);
    }

    #[test]
    fn stop_is_idempotent_and_refuses_work() {
        let h = setup();
        h.acquirer.acquire([1u8; 32], 5, AcquireReason::Consensus);

        h.acquirer.stop();
        h.acquirer.stop();
        assert!(h.acquirer.is_stopped());
        assert_eq!(h.acquirer.fetch_counts().0, 0);
        assert!(!h.acquirer.acquire([2u8; 32], 6, AcquireReason::Consensus));
        assert!(h.acquirer.tick().is_empty());
    }
}
