//! Criterion micro-benchmarks for path resolution and clock lookup.

use std::hint::black_box;

use braid_bench::{chain, comb};
use braid_core::Rounding;
use braid_tree::Path;
use criterion::{criterion_group, criterion_main, Criterion};

/// Benchmark: index into a 100K-node chain held in one block.
fn bench_chain_get(c: &mut Criterion) {
    let (tree, tip) = chain(100_000);
    let path = Path::ending_at(&tree, tip).unwrap();
    c.bench_function("chain_100k_get", |b| {
        b.iter(|| black_box(path.get(&tree, black_box(73_421)).unwrap()));
    });
}

/// Benchmark: clock lookup on a 100K-node chain.
fn bench_chain_clock(c: &mut Criterion) {
    let (tree, tip) = chain(100_000);
    let path = Path::ending_at(&tree, tip).unwrap();
    c.bench_function("chain_100k_clock", |b| {
        b.iter(|| {
            black_box(
                path.get_node_by_clock(&tree, black_box(51_234.5), Rounding::Both)
                    .unwrap(),
            )
        });
    });
}

/// Benchmark: resolve a spine crossing 1K forks, then look up by clock.
fn bench_comb_clock(c: &mut Criterion) {
    let (tree, tip) = comb(10_000, 10, 2);
    let path = Path::ending_at(&tree, tip).unwrap();
    c.bench_function("comb_10k_clock", |b| {
        b.iter(|| {
            black_box(
                path.get_node_by_clock(&tree, black_box(7_777.0), Rounding::Exact)
                    .unwrap(),
            )
        });
    });
}

/// Benchmark: list the leaves of a comb, hopping over blocks.
fn bench_comb_leaves(c: &mut Criterion) {
    let (tree, _) = comb(10_000, 10, 2);
    let root = tree.roots()[0];
    c.bench_function("comb_10k_leaves", |b| {
        b.iter(|| black_box(tree.leaves(root, None).unwrap().len()));
    });
}

criterion_group!(
    benches,
    bench_chain_get,
    bench_chain_clock,
    bench_comb_clock,
    bench_comb_leaves
);
criterion_main!(benches);
