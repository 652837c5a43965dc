//! Micro benchmarks for the bucket B-tree index.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sombra_index::primitives::pager::{Pager, PagerOptions};
use sombra_index::storage::btree::{BTree, BTreeOptions, Direction, IndexCursor, IndexKey, SeekBound};
use sombra_index::storage::IndexConfig;
use sombra_index::types::RecordLoc;

const INSERT_COUNT: u64 = 32_768;
const LOOKUP_SAMPLES: usize = 4_096;
const RANGE_WIDTH: u64 = 512;

fn micro_btree(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/btree");
    group.sample_size(30);

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("sequential_insert", |b| {
        b.iter_batched(
            FreshTree::new,
            |tree| {
                tree.insert_sequence(0, INSERT_COUNT);
                black_box(tree.tree.stats_snapshot());
            },
            BatchSize::SmallInput,
        );
    });

    let mut random_keys: Vec<u64> = (0..INSERT_COUNT).collect();
    random_keys.shuffle(&mut ChaCha8Rng::seed_from_u64(0xBEEF_F00D));
    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("random_insert", |b| {
        b.iter_batched(
            FreshTree::new,
            |tree| {
                tree.insert_keys(&random_keys);
                black_box(tree.tree.stats_snapshot());
            },
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("bulk_load", |b| {
        b.iter_batched(
            FreshTree::new,
            |tree| black_box(tree.bulk_load(INSERT_COUNT)),
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("unindex_random", |b| {
        b.iter_batched(
            || {
                let tree = FreshTree::new();
                tree.insert_sequence(0, INSERT_COUNT);
                tree
            },
            |tree| {
                tree.unindex_keys(&random_keys);
                black_box(tree.tree.stats_snapshot());
            },
            BatchSize::SmallInput,
        );
    });

    let mut lookup_harness = LoadedTree::new(INSERT_COUNT);
    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function(BenchmarkId::new("locate", LOOKUP_SAMPLES), |b| {
        b.iter(|| lookup_harness.locate(LOOKUP_SAMPLES));
    });

    group.throughput(Throughput::Elements(RANGE_WIDTH));
    group.bench_function(BenchmarkId::new("range_scan", RANGE_WIDTH), |b| {
        b.iter(|| lookup_harness.range_scan(RANGE_WIDTH));
    });

    group.finish();
}

struct FreshTree {
    pager: Pager,
    tree: BTree,
}

impl FreshTree {
    fn new() -> Self {
        let config = IndexConfig {
            pager: PagerOptions::default(),
            btree: BTreeOptions {
                index_name: "bench".to_owned(),
                ..BTreeOptions::default()
            },
            ..IndexConfig::default()
        };
        let (pager, tree) = config.open().expect("index");
        Self { pager, tree }
    }

    fn insert_sequence(&self, start: u64, count: u64) {
        let mut write = self.pager.begin_write().expect("write");
        for key in start..(start + count) {
            self.tree
                .insert(&mut write, &IndexKey::from_u64(key), RecordLoc(key), false)
                .expect("insert");
        }
        self.pager.commit(write).expect("commit");
    }

    fn insert_keys(&self, keys: &[u64]) {
        let mut write = self.pager.begin_write().expect("write");
        for key in keys {
            self.tree
                .insert(&mut write, &IndexKey::from_u64(*key), RecordLoc(*key), false)
                .expect("insert");
        }
        self.pager.commit(write).expect("commit");
    }

    fn bulk_load(&self, count: u64) -> u64 {
        let mut write = self.pager.begin_write().expect("write");
        let mut builder = self.tree.builder(&mut write, false).expect("builder");
        for key in 0..count {
            builder
                .add_key(&IndexKey::from_u64(key), RecordLoc(key))
                .expect("add key");
        }
        let loaded = builder.commit().expect("bulk commit");
        drop(builder);
        self.pager.commit(write).expect("commit");
        loaded
    }

    fn unindex_keys(&self, keys: &[u64]) {
        let mut write = self.pager.begin_write().expect("write");
        for key in keys {
            self.tree
                .unindex(&mut write, &IndexKey::from_u64(*key), RecordLoc(*key))
                .expect("unindex");
        }
        self.pager.commit(write).expect("commit");
    }
}

struct LoadedTree {
    fresh: FreshTree,
    max_key: u64,
    rng: ChaCha8Rng,
}

impl LoadedTree {
    fn new(count: u64) -> Self {
        let fresh = FreshTree::new();
        fresh.insert_sequence(0, count);
        Self {
            fresh,
            max_key: count,
            rng: ChaCha8Rng::seed_from_u64(0xFEED_FACE),
        }
    }

    fn locate(&mut self, samples: usize) {
        let read = self.fresh.pager.begin_read().expect("read");
        for _ in 0..samples {
            let key = self.rng.gen_range(0..self.max_key);
            black_box(
                self.fresh
                    .tree
                    .locate(&read, &IndexKey::from_u64(key), RecordLoc(key), Direction::Forward)
                    .expect("locate"),
            );
        }
    }

    fn range_scan(&mut self, width: u64) {
        let read = self.fresh.pager.begin_read().expect("read");
        for _ in 0..16 {
            let start = self.rng.gen_range(0..(self.max_key - width));
            let mut cursor = IndexCursor::new(&self.fresh.tree, Direction::Forward);
            cursor
                .seek_bound(&read, &SeekBound::at_key(&IndexKey::from_u64(start), true))
                .expect("seek");
            for _ in 0..width {
                match cursor.next(&read).expect("cursor") {
                    Some(entry) => {
                        black_box(entry);
                    }
                    None => break,
                }
            }
        }
    }
}

criterion_group!(benches, micro_btree);
criterion_main!(benches);
