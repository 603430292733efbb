//! Codec benchmarks for tourney-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tourney_protocol::{codec, round_name, Bracket, BracketSize, Event, Match, Round, TournamentSnapshot};

fn snapshot(size: BracketSize) -> TournamentSnapshot {
    let count = size.round_count();
    let rounds = (0..count)
        .map(|r| Round {
            name: round_name(r, count),
            matches: (0..size.contestants() >> (r + 1))
                .map(|m| {
                    let mut slot = Match::new(format!("r{}m{}", r + 1, m));
                    slot.player1.name = format!("Player {}", m * 2);
                    slot.player2.name = format!("Player {}", m * 2 + 1);
                    slot
                })
                .collect(),
        })
        .collect();

    TournamentSnapshot::new(
        Bracket {
            size,
            rounds,
            champion: None,
        },
        0,
    )
}

fn bench_encode_snapshot(c: &mut Criterion) {
    let event = Event::tournament_updated(snapshot(BracketSize::ThirtyTwo));
    let len = codec::encode(&event).unwrap().len();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(len as u64));
    group.bench_function("snapshot_32", |b| b.iter(|| codec::encode(black_box(&event))));
    group.finish();
}

fn bench_decode_snapshot(c: &mut Criterion) {
    let event = Event::tournament_updated(snapshot(BracketSize::ThirtyTwo));
    let encoded = codec::encode(&event).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("snapshot_32", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let snapshot = snapshot(BracketSize::ThirtyTwo);

    c.bench_function("fingerprint_32", |b| {
        b.iter(|| black_box(&snapshot).fingerprint().unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_snapshot,
    bench_decode_snapshot,
    bench_fingerprint
);
criterion_main!(benches);
