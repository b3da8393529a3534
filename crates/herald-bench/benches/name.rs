//! Name grammar benchmarks.
//!
//! Every message and subscription factory validates its names, so these sit on
//! the hot path of batch construction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use herald_protocol::Name;

/// Benchmark validation of valid and invalid names.
fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");

    group.bench_function("topic", |b| {
        b.iter(|| Name::new(black_box("v1.orders.process")))
    });
    group.bench_function("queue", |b| {
        b.iter(|| Name::new(black_box("v1.orders.process.queue")))
    });
    group.bench_function("deep", |b| {
        b.iter(|| Name::new(black_box("v12.region.warehouse.orders.process.queue")))
    });
    group.bench_function("invalid", |b| {
        b.iter(|| Name::new(black_box("orders.process")))
    });

    group.finish();
}

/// Benchmark topic/queue conversion.
fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");

    let topic = Name::raw("v1.orders.process");
    let queue = Name::raw("v1.orders.process.queue");

    group.bench_function("to_queue", |b| b.iter(|| black_box(&topic).to_queue()));
    group.bench_function("to_topic", |b| b.iter(|| black_box(&queue).to_topic()));
    group.bench_function("parts", |b| b.iter(|| black_box(&queue).parts()));

    group.finish();
}

criterion_group!(benches, bench_validate, bench_convert);
criterion_main!(benches);
