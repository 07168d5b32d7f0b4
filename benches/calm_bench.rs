//! Criterion benchmarks for CALM stepping and training.
//!
//! Run with: `cargo bench --bench calm_bench`
//!
//! ## Benchmarks
//!
//! 1. **Single learning step** at several module sizes
//! 2. **Test step** (no weight update) for comparison
//! 3. **Training epoch** over a one-hot pattern file

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;

use calm::data::PatternSet;
use calm::{Config, LinkMode, ModuleKind, Network, Parameters, PatternOrder, SimRng, Simulator};

/// `inp(n) -> cat(k)`, then `cat -> out(k)` through a delayed link.
fn bench_network(input: usize, cat: usize, seed: u64) -> Network {
    let mut net = Network::new(Parameters::default(), SimRng::seeded(seed));
    net.add_module("inp", ModuleKind::Input, input).unwrap();
    net.add_module("cat", ModuleKind::Calm, cat).unwrap();
    net.add_module("out", ModuleKind::Calm, cat).unwrap();
    net.connect("cat", "inp", LinkMode::Immediate).unwrap();
    net.connect("out", "cat", LinkMode::Delayed(2)).unwrap();
    net
}

fn one_hot(n: usize) -> PatternSet {
    PatternSet::new(vec![Array2::eye(n)]).unwrap()
}

fn bench_learn_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("learn_step");
    for &size in &[4usize, 16, 64] {
        let mut net = bench_network(size, size, 1);
        net.load_patterns(one_hot(size)).unwrap();
        net.set_input(0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                net.learn();
                black_box(net.winner(2));
            })
        });
    }
    group.finish();
}

fn bench_test_step(c: &mut Criterion) {
    let mut net = bench_network(16, 16, 2);
    net.load_patterns(one_hot(16)).unwrap();
    net.set_input(3).unwrap();
    c.bench_function("test_step_16", |b| {
        b.iter(|| {
            net.test();
            black_box(net.sum_activation(None));
        })
    });
}

fn bench_train_epoch(c: &mut Criterion) {
    let config = Config {
        iterations: 50,
        order: PatternOrder::Linear,
        ..Config::default()
    };
    let mut net = bench_network(8, 8, 3);
    net.load_patterns(one_hot(8)).unwrap();
    let mut sim = Simulator::new(net, config);
    let mut epoch = 0;
    c.bench_function("train_epoch_8x50", |b| {
        b.iter(|| {
            let summary = sim.train_file(epoch).unwrap();
            epoch += 1;
            black_box(summary.wt_change);
        })
    });
}

criterion_group!(benches, bench_learn_step, bench_test_step, bench_train_epoch);
criterion_main!(benches);
