//! Pipeline Benchmarks - synchronous operator chains
//!
//! Measures per-element overhead of the demand protocol for the common
//! operator shapes (map/filter chains, flat_map merging, concatenation)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use reflux::Flux;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Drain a flux into an accumulator, returning the sum
fn drain(flux: &Flux<i64>) -> i64 {
    let sum = Arc::new(AtomicI64::new(0));
    let sink = sum.clone();
    flux.subscribe_with(
        move |value| {
            sink.fetch_add(value, Ordering::Relaxed);
        },
        |_| {},
        || {},
    );
    sum.load(Ordering::Relaxed)
}

fn bench_map_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_filter");

    for size in [1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(size as u64));
        let flux = Flux::range(0, size)
            .map(|n| n * 3)
            .filter(|n| n % 2 == 0)
            .map(|n| n + 1);

        group.bench_with_input(BenchmarkId::from_parameter(size), &flux, |b, flux| {
            b.iter(|| black_box(drain(flux)));
        });
    }

    group.finish();
}

fn bench_flat_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_map");

    for inner in [1usize, 10, 100] {
        let outer = 10_000 / inner;
        group.throughput(Throughput::Elements((outer * inner) as u64));
        let flux = Flux::range(0, outer).flat_map(move |n| Flux::range(n, inner));

        group.bench_with_input(BenchmarkId::new("inner_size", inner), &flux, |b, flux| {
            b.iter(|| black_box(drain(flux)));
        });
    }

    group.finish();
}

fn bench_concat(c: &mut Criterion) {
    let mut group = c.benchmark_group("concat");

    for sources in [2usize, 16, 128] {
        group.throughput(Throughput::Elements((sources * 100) as u64));
        let flux = Flux::concat((0..sources).map(|_| Flux::range(0, 100)).collect());

        group.bench_with_input(BenchmarkId::new("sources", sources), &flux, |b, flux| {
            b.iter(|| black_box(drain(flux)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_map_filter, bench_flat_map, bench_concat);
criterion_main!(benches);
