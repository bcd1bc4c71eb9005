use collab_core::ReplicaId;
use collab_position::PositionList;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

fn replica(seed: u64) -> ReplicaId {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    ReplicaId::generate_from(&mut rng)
}

fn append_only(c: &mut Criterion) {
    c.bench_function("append_1000_singletons", |b| {
        b.iter(|| {
            let mut list = PositionList::new(replica(1));
            for _ in 0..1000 {
                let (positions, _) = list.insert_at(list.len(), 1).unwrap();
                black_box(positions);
            }
        })
    });
}

fn random_middle_inserts(c: &mut Criterion) {
    c.bench_function("insert_1000_at_midpoint", |b| {
        b.iter(|| {
            let mut list = PositionList::new(replica(2));
            list.insert_at(0, 1).unwrap();
            for _ in 0..1000 {
                let mid = list.len() / 2;
                let (positions, _) = list.insert_at(mid, 1).unwrap();
                black_box(positions);
            }
        })
    });
}

fn compare_under_depth(c: &mut Criterion) {
    let mut list = PositionList::new(replica(3));
    for _ in 0..500 {
        list.insert_at(0, 1).unwrap();
    }
    let first = list.position_of(0).unwrap();
    let last = list.position_of(list.len() - 1).unwrap();
    c.bench_function("compare_two_deep_positions", |b| {
        b.iter(|| black_box(list.tree().compare(first, last).unwrap()))
    });
}

criterion_group!(benches, append_only, random_middle_inserts, compare_under_depth);
criterion_main!(benches);
