//! Propagation Benchmarks
//!
//! Measures what a write costs (dirty marking only) and what the following
//! read or flush costs (recomputation) for a few graph shapes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{Computed, ReactiveError, Runtime, Signal};

/// A linear chain of `depth` computed nodes on top of one signal.
fn chain(rt: &Runtime, depth: usize) -> (Signal<u64>, Computed<u64>) {
    let source = rt.state(0u64);
    let s = source.clone();
    let mut tail = rt.computed(move || s.get() + 1);

    for _ in 1..depth {
        let prev = tail.clone();
        tail = rt.try_computed(move || Ok::<_, ReactiveError>(prev.get()? + 1));
    }
    (source, tail)
}

fn bench_chain_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_write_then_read");

    for depth in [1usize, 10, 100] {
        let rt = Runtime::new();
        let (source, tail) = chain(&rt, depth);
        tail.get().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                source.update(|v| v + 1);
                black_box(tail.get().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_fan_out_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_write");

    for width in [10usize, 100, 1000] {
        let rt = Runtime::new();
        let source = rt.state(0u64);
        let nodes: Vec<Computed<u64>> = (0..width)
            .map(|i| {
                let s = source.clone();
                rt.computed(move || s.get() + i as u64)
            })
            .collect();
        for node in &nodes {
            node.get().unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| black_box(source.update(|v| v + 1)));
        });
    }

    group.finish();
}

fn bench_effect_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_flush");

    for effects in [1usize, 10, 100] {
        let rt = Runtime::new();
        let source = rt.state(0u64);
        let handles: Vec<_> = (0..effects)
            .map(|_| {
                let s = source.clone();
                rt.effect(move || {
                    black_box(s.get());
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(effects), &effects, |b, _| {
            b.iter(|| {
                source.update(|v| v + 1);
                black_box(rt.tick())
            });
        });

        for handle in handles {
            handle.dispose();
        }
    }

    group.finish();
}

criterion_group!(benches, bench_chain_read, bench_fan_out_write, bench_effect_flush);
criterion_main!(benches);
