//! End-to-end fan-out benchmark for Herald.
//!
//! Connects every configured backend (two in-memory backends when no
//! `herald.toml` lists any), subscribes one consumer across all of them and
//! measures how fast a published batch comes back out of the channel.

use anyhow::Context as _;
use herald_bench::{orders, ORDERS_TOPIC};
use herald_core::{BackendConfig, Context, HeraldConfig, Message, Registry, Subscription};
use herald_transport::MemoryBroker;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DRAIN_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "herald=info".into()))
        .with(fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let num_messages: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(10_000);

    let mut config = HeraldConfig::load()?;
    if config.backends.is_empty() {
        config.backends = ["primary", "secondary"]
            .into_iter()
            .map(|name| BackendConfig {
                name: name.to_string(),
                address: format!("memory://{name}"),
            })
            .collect();
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║            Herald End-to-End Fan-out Benchmark               ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let broker = MemoryBroker::new();
    let registry = Registry::from_config(&config, &broker, config.metrics.sink())
        .await
        .context("failed to connect backends")?;
    println!("✓ Connected backends: {}", registry.names().join(", "));

    let handled = Arc::new(AtomicU64::new(0));
    let received = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&handled);
    let sub = Subscription::new(ORDERS_TOPIC, ORDERS_TOPIC, move |_: &Message| {
        counter.fetch_add(1, Ordering::Relaxed);
    })?;
    let mut rx = sub
        .take_receiver()
        .context("fresh subscription has no receiver")?;

    let drained = Arc::clone(&received);
    let drain_task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            drained.fetch_add(1, Ordering::Relaxed);
        }
    });

    let ctx = Context::new();
    registry
        .subscribe_many(&ctx, &[sub], &[])
        .await
        .into_result()?;

    let messages = orders(num_messages);
    let expected = (messages.len() * registry.len()) as u64;

    println!("📊 Publishing {} messages to {} backends", messages.len(), registry.len());
    let start = Instant::now();

    let batch = registry.publish_many(&ctx, &messages, &[]).await;
    let publish_elapsed = start.elapsed();
    let failures = batch.errors.len();
    if !batch.is_ok() {
        tracing::warn!(failures, "Some publications failed");
    }

    let deadline = Instant::now() + Duration::from_secs(DRAIN_TIMEOUT_SECS);
    while received.load(Ordering::Relaxed) < expected && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let elapsed = start.elapsed();
    let total_received = received.load(Ordering::Relaxed);
    let msgs_per_sec = total_received as f64 / elapsed.as_secs_f64();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Backends:             {:>10}                           ║",
        registry.len()
    );
    println!(
        "║  Published:            {:>10}                           ║",
        batch.len() - failures
    );
    println!(
        "║  Failed:               {:>10}                           ║",
        failures
    );
    println!(
        "║  Handled:              {:>10}                           ║",
        handled.load(Ordering::Relaxed)
    );
    println!(
        "║  Received:             {:>10}                           ║",
        total_received
    );
    println!(
        "║  Publish Time:         {:>10.2}ms                         ║",
        publish_elapsed.as_secs_f64() * 1000.0
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        msgs_per_sec
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    if total_received < expected {
        tracing::warn!(expected, received = total_received, "Timed out draining deliveries");
    }

    registry.close_all().await?;
    drain_task.abort();
    info!("Benchmark complete");
    Ok(())
}
