//! Benchmarks for the hybrid tree using Divan.
//!
//! Run with: `cargo bench --bench tree`
//!
//! The mixed groups mirror the classic evaluation workload: bulk-load a
//! sequential data set, then spawn reader and writer threads over the
//! shared tree and measure whole-batch throughput.

#![allow(clippy::unwrap_used)]
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::thread;

use divan::{Bencher, black_box};
use hybtree::HybridTree;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() {
    divan::main();
}

const MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// Deterministic shuffled keys: dense domain, pseudo-random order.
fn scrambled_keys(n: usize) -> Vec<u64> {
    (0..n as u64).map(|i| i.wrapping_mul(MULTIPLIER)).collect()
}

fn loaded_tree(n: usize) -> HybridTree<u64, u64> {
    let pairs: Vec<(u64, u64)> = (0..n as u64).map(|k| (k, k)).collect();
    let tree: HybridTree<u64, u64> = HybridTree::new();
    tree.bulk_load(&pairs);
    tree
}

// =============================================================================
// Construction and loading
// =============================================================================

#[divan::bench_group]
mod load {
    use super::{Bencher, HybridTree, scrambled_keys};

    const N: usize = 100_000;

    #[divan::bench]
    fn bulk_load_sequential(bencher: Bencher) {
        let pairs: Vec<(u64, u64)> = (0..N as u64).map(|k| (k, k)).collect();
        bencher.bench_local(|| {
            let tree: HybridTree<u64, u64> = HybridTree::new();
            tree.bulk_load(&pairs);
            tree
        });
    }

    #[divan::bench]
    fn insert_sequential(bencher: Bencher) {
        bencher.bench_local(|| {
            let tree: HybridTree<u64, u64> = HybridTree::new();
            for k in 0..N as u64 {
                tree.insert(k, k);
            }
            tree
        });
    }

    #[divan::bench]
    fn insert_scrambled(bencher: Bencher) {
        let keys = scrambled_keys(N);
        bencher.bench_local(|| {
            let tree: HybridTree<u64, u64> = HybridTree::new();
            for &k in &keys {
                tree.insert(k, k);
            }
            tree
        });
    }
}

// =============================================================================
// Point operations on a loaded tree
// =============================================================================

#[divan::bench_group]
mod point {
    use super::{Bencher, HybridTree, Rng, SeedableRng, StdRng, black_box, loaded_tree};

    const N: usize = 100_000;

    #[divan::bench]
    fn lookup_hit(bencher: Bencher) {
        let tree = loaded_tree(N);
        let mut rng = StdRng::seed_from_u64(1);

        bencher.bench_local(|| {
            let k: u64 = rng.random_range(0..N as u64);
            black_box(tree.lookup(black_box(k)))
        });
    }

    #[divan::bench]
    fn lookup_miss(bencher: Bencher) {
        let tree = loaded_tree(N);
        let mut rng = StdRng::seed_from_u64(2);

        bencher.bench_local(|| {
            let k: u64 = (N as u64) + rng.random_range(0..N as u64);
            black_box(tree.lookup(black_box(k)))
        });
    }

    #[divan::bench]
    fn upsert_existing(bencher: Bencher) {
        let tree = loaded_tree(N);
        let mut rng = StdRng::seed_from_u64(3);

        bencher.bench_local(|| {
            let k: u64 = rng.random_range(0..N as u64);
            tree.insert(black_box(k), 0);
        });
    }

    #[divan::bench(args = [8, 64, 512])]
    fn scan(bencher: Bencher, range: usize) {
        let tree = loaded_tree(N);
        let mut rng = StdRng::seed_from_u64(4);
        let mut out: Vec<u64> = vec![0; range];

        bencher.bench_local(|| {
            let k: u64 = rng.random_range(0..N as u64);
            black_box(tree.scan(black_box(k), &mut out))
        });
    }
}

// =============================================================================
// Mixed reader/writer threads
// =============================================================================

#[divan::bench_group(sample_count = 10)]
mod mixed {
    use super::{Arc, Bencher, HybridTree, Rng, SeedableRng, StdRng, black_box, loaded_tree, thread};

    const PRELOAD: usize = 100_000;
    const OPS: usize = 20_000;

    fn run(tree: &Arc<HybridTree<u64, u64>>, readers: usize, writers: usize) {
        thread::scope(|s| {
            for w in 0..writers {
                let tree = Arc::clone(tree);
                s.spawn(move || {
                    for i in 0..OPS {
                        let k: u64 = (PRELOAD + w * OPS + i) as u64;
                        tree.insert(k, k);
                    }
                });
            }
            for r in 0..readers {
                let tree = Arc::clone(tree);
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(r as u64);
                    for _ in 0..OPS {
                        let k: u64 = rng.random_range(0..PRELOAD as u64);
                        black_box(tree.lookup(k));
                    }
                });
            }
        });
    }

    #[divan::bench(args = [2, 8, 16])]
    fn balanced(bencher: Bencher, threads: usize) {
        bencher
            .with_inputs(|| Arc::new(loaded_tree(PRELOAD)))
            .bench_local_values(|tree| {
                run(&tree, threads / 2, threads / 2);
                tree
            });
    }

    #[divan::bench(args = [4, 8, 16])]
    fn read_heavy(bencher: Bencher, threads: usize) {
        bencher
            .with_inputs(|| Arc::new(loaded_tree(PRELOAD)))
            .bench_local_values(|tree| {
                run(&tree, threads - threads / 4, threads / 4);
                tree
            });
    }

    #[divan::bench(args = [4, 8, 16])]
    fn write_heavy(bencher: Bencher, threads: usize) {
        bencher
            .with_inputs(|| Arc::new(loaded_tree(PRELOAD)))
            .bench_local_values(|tree| {
                run(&tree, threads / 4, threads - threads / 4);
                tree
            });
    }
}

// =============================================================================
// Hot-range contention (the cache's reason to exist)
// =============================================================================

#[divan::bench_group(sample_count = 10)]
mod hot_range {
    use super::{Arc, Bencher, HybridTree, black_box, loaded_tree, thread};

    const PRELOAD: usize = 100_000;
    const OPS: usize = 20_000;
    const SPREAD: u64 = 4_000;

    #[divan::bench(args = [2, 4, 8])]
    fn contended_upsert(bencher: Bencher, threads: usize) {
        bencher
            .with_inputs(|| Arc::new(loaded_tree(PRELOAD)))
            .bench_local_values(|tree| {
                thread::scope(|s| {
                    for _ in 0..threads {
                        let tree = Arc::clone(&tree);
                        s.spawn(move || {
                            for i in 0..OPS {
                                let k: u64 = 50_000 + (i as u64 % SPREAD);
                                tree.insert(k, 1);
                                black_box(tree.lookup(k));
                            }
                        });
                    }
                });
                tree
            });
    }
}
