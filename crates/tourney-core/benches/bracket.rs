//! Bracket engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tourney_core::bracket::{self, SlotField};
use tourney_protocol::{Bracket, BracketSize, Slot};

/// Fill every first-round slot and play the tournament to the end.
fn play_out(size: BracketSize) -> Bracket {
    let mut b = bracket::build(size);

    for index in 0..size.contestants() / 2 {
        for (slot, seed) in [(Slot::Player1, index * 2), (Slot::Player2, index * 2 + 1)] {
            bracket::record_slot(&mut b, "Round 1", index, slot, SlotField::Name(format!("P{seed}")));
            bracket::record_slot(&mut b, "Round 1", index, slot, SlotField::Score(Some(seed as f64)));
        }
    }

    for r in 0..b.rounds.len() {
        let name = b.rounds[r].name.clone();
        for index in 0..b.rounds[r].matches.len() {
            for slot in [Slot::Player1, Slot::Player2] {
                bracket::record_slot(&mut b, &name, index, slot, SlotField::Score(Some(1.0)));
            }
            let _ = bracket::decide_winner(&mut b, &name, index);
        }
    }
    b
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for size in BracketSize::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| bracket::build(black_box(size)))
        });
    }
    group.finish();
}

fn bench_play_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("play_out");
    for size in BracketSize::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| play_out(black_box(size)))
        });
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let finished = play_out(BracketSize::ThirtyTwo);

    c.bench_function("validate_32", |b| {
        b.iter(|| bracket::validate(black_box(&finished)))
    });
}

criterion_group!(benches, bench_build, bench_play_out, bench_validate);
criterion_main!(benches);
