//! A five-validator consensus network, simulated in one process.
//!
//! Drives one node's round state machine against four scripted peers
//! that always agree with it, on a manual clock. Three ledgers close in
//! a few microseconds of real time.
//!
//! ```text
//! cargo run --example demo -p pulsar-protocol
//! ```

use std::sync::Arc;

use pulsar_protocol::consensus::clock::{Clock, ManualClock};
use pulsar_protocol::consensus::driver::{
    ConsensusEvent, CoreContext, DriverConfig, RoundDriver, TxSetCache,
};
use pulsar_protocol::consensus::positions::PositionStore;
use pulsar_protocol::consensus::proposal::Proposal;
use pulsar_protocol::consensus::validation::Validation;
use pulsar_protocol::consensus::validations::ValidationStore;
use pulsar_protocol::crypto::keys::PulsarKeypair;
use pulsar_protocol::ledger::apply::{DeterministicApplicator, TxApplicator};
use pulsar_protocol::network::acquire::InboundLedgers;
use pulsar_protocol::storage::history::LedgerHistory;
use pulsar_protocol::storage::node_store::{MemoryStore, NodeStore};
use pulsar_protocol::validators::unl::TrustedValidators;

fn main() {
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new());
    let clock_dyn: Arc<dyn Clock> = clock.clone();

    // Our validator plus four agreeable peers.
    let keypair = PulsarKeypair::generate();
    let peers: Vec<PulsarKeypair> = (0..4).map(|_| PulsarKeypair::generate()).collect();
    let unl = TrustedValidators::shared();
    unl.add(keypair.public_key(), "us");
    for (i, peer) in peers.iter().enumerate() {
        unl.add(peer.public_key(), format!("peer-{i}"));
    }

    let history = Arc::new(LedgerHistory::new());
    let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
    let ctx = CoreContext {
        clock: clock_dyn.clone(),
        positions: Arc::new(PositionStore::new(clock_dyn.clone(), unl.clone())),
        validations: Arc::new(ValidationStore::new(clock_dyn.clone(), unl.clone())),
        tx_sets: Arc::new(TxSetCache::new()),
        acquirer: Arc::new(InboundLedgers::new(
            clock_dyn.clone(),
            history.clone(),
            store.clone(),
        )),
        applicator: Arc::new(DeterministicApplicator::new()),
        unl,
        history: history.clone(),
        store,
    };

    let mut driver = RoundDriver::new(DriverConfig::default(), keypair, ctx.clone());

    println!("genesis: {}", hex::encode(history.lcl().hash()));

    for round in 1..=3u32 {
        // Somebody submits a transaction.
        ctx.applicator.open_ledger_add(format!("payment-{round}").as_bytes());

        // Tick until the round completes, echoing our position and
        // validation from every peer as soon as they appear.
        for _ in 0..20 {
            clock.advance_ms(1_000);
            let events = driver.tick().expect("driver healthy");

            for event in events {
                match event {
                    ConsensusEvent::Propose(p) if p.proposer_seq == 0 => {
                        for peer in &peers {
                            ctx.positions.insert_peer(Proposal::new(
                                peer,
                                p.parent_hash,
                                p.tx_set_root,
                                p.close_time,
                                0,
                            ));
                        }
                    }
                    ConsensusEvent::Validate(v) => {
                        for peer in &peers {
                            ctx.validations.insert(Validation::full(
                                peer,
                                v.ledger_hash,
                                v.seq,
                                clock.wall_secs(),
                            ));
                        }
                    }
                    ConsensusEvent::LclAdvanced { ledger } => {
                        println!(
                            "round {round}: ledger {} closed at seq {} ({} txs, close time {})",
                            hex::encode(ledger.hash()),
                            ledger.seq(),
                            ledger.tx_ids.len(),
                            ledger.header.close_time,
                        );
                    }
                    _ => {}
                }
            }

            if history.lcl().seq() >= round {
                break;
            }
        }
    }

    println!("final LCL seq: {}", history.lcl().seq());
}
