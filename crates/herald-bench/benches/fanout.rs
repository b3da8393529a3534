//! Batch fan-out benchmarks over the in-memory broker.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use herald_bench::{memory_backend, orders};
use herald_core::{Context, PubSubConfig, Registry, WireFormat};
use herald_transport::MemoryBroker;
use tokio::runtime::Runtime;

/// Benchmark publishing batches of increasing size on one backend.
fn bench_publish(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish");

    for format in [WireFormat::Json, WireFormat::MessagePack] {
        let broker = MemoryBroker::new();
        let config = PubSubConfig {
            wire_format: format,
            ..PubSubConfig::default()
        };
        let pubsub = rt
            .block_on(memory_backend("bench", &broker, config))
            .unwrap();

        for size in [1usize, 16, 256] {
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(BenchmarkId::new(format.as_str(), size), &size, |b, &size| {
                b.to_async(&rt).iter(|| async {
                    let batch = pubsub.publish(&Context::new(), orders(size), &[]).await;
                    assert!(batch.is_ok());
                });
            });
        }
    }

    group.finish();
}

/// Benchmark bounded concurrency against the unbounded default.
fn bench_concurrency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrency");
    group.throughput(Throughput::Elements(256));

    for limit in [Some(1usize), Some(8), None] {
        let broker = MemoryBroker::new();
        let config = PubSubConfig {
            max_concurrency: limit,
            ..PubSubConfig::default()
        };
        let pubsub = rt
            .block_on(memory_backend("bench", &broker, config))
            .unwrap();
        let label = limit.map_or_else(|| "unbounded".to_string(), |n| n.to_string());

        group.bench_function(label, |b| {
            b.to_async(&rt)
                .iter(|| async { pubsub.publish(&Context::new(), orders(256), &[]).await });
        });
    }

    group.finish();
}

/// Benchmark the registry repeating a batch across backends.
fn bench_registry(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("registry");

    for backends in [1usize, 4] {
        let registry = Registry::new();
        for i in 0..backends {
            let broker = MemoryBroker::new();
            let pubsub = rt
                .block_on(memory_backend(&format!("backend{i}"), &broker, PubSubConfig::default()))
                .unwrap();
            registry.register(pubsub).unwrap();
        }
        let messages = orders(64);

        group.throughput(Throughput::Elements((64 * backends) as u64));
        group.bench_with_input(BenchmarkId::new("publish_many", backends), &backends, |b, _| {
            b.to_async(&rt)
                .iter(|| async { registry.publish_many(&Context::new(), &messages, &[]).await });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish, bench_concurrency, bench_registry);
criterion_main!(benches);
