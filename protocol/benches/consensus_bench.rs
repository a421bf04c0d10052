//! Criterion benchmarks for the consensus hot paths.
//!
//! The timing rules run on every granule, and the stores absorb every
//! proposal and validation the overlay delivers. None of these should
//! ever show up in a flame graph; these benches are the tripwire.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pulsar_protocol::consensus::clock::{Clock, ManualClock};
use pulsar_protocol::consensus::positions::PositionStore;
use pulsar_protocol::consensus::proposal::Proposal;
use pulsar_protocol::consensus::timing::{check_consensus, round_close_time, should_close_ledger};
use pulsar_protocol::consensus::validation::Validation;
use pulsar_protocol::consensus::validations::ValidationStore;
use pulsar_protocol::crypto::keys::PulsarKeypair;
use pulsar_protocol::validators::unl::TrustedValidators;

fn bench_timing_rules(c: &mut Criterion) {
    c.bench_function("should_close_ledger", |b| {
        b.iter(|| {
            should_close_ledger(
                black_box(true),
                black_box(30),
                black_box(12),
                black_box(3),
                black_box(4_000),
                black_box(3_000),
                black_box(3_000),
                black_box(15),
            )
        })
    });

    c.bench_function("check_consensus", |b| {
        b.iter(|| {
            check_consensus(
                black_box(30),
                black_box(28),
                black_box(22),
                black_box(2),
                black_box(4_000),
                black_box(3_000),
            )
        })
    });

    c.bench_function("round_close_time", |b| {
        b.iter(|| round_close_time(black_box(1_767_225_617), black_box(30)))
    });
}

fn bench_position_ingest(c: &mut Criterion) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let unl = TrustedValidators::shared();
    let keypair = PulsarKeypair::generate();
    unl.add(keypair.public_key(), "bench");
    let store = PositionStore::new(clock.clone(), unl);

    let wall = clock.wall_secs();
    let mut seq = 0u32;

    c.bench_function("position_store_insert", |b| {
        b.iter(|| {
            // Each insert supersedes the previous one, so the store stays
            // at one entry and the bench measures ingest, not growth.
            seq += 1;
            let proposal = Proposal::new(&keypair, [1u8; 32], [2u8; 32], wall, seq);
            store.insert_peer(black_box(proposal))
        })
    });
}

fn bench_quorum_tally(c: &mut Criterion) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let unl = TrustedValidators::shared();
    let validators: Vec<PulsarKeypair> = (0..32).map(|_| PulsarKeypair::generate()).collect();
    for (i, kp) in validators.iter().enumerate() {
        unl.add(kp.public_key(), format!("bench-{i}"));
    }
    let store = ValidationStore::new(clock.clone(), unl);

    let wall = clock.wall_secs();
    for kp in &validators {
        store.insert(Validation::full(kp, [7u8; 32], 10, wall));
    }

    c.bench_function("validation_quorum_tally_32", |b| {
        b.iter(|| store.trusted_for(black_box(10)))
    });

    c.bench_function("best_validated_ledger_32", |b| {
        b.iter(|| store.best_validated_ledger())
    });
}

criterion_group!(
    benches,
    bench_timing_rules,
    bench_position_ingest,
    bench_quorum_tally
);
criterion_main!(benches);
