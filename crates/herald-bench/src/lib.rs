//! Shared setup for Herald benchmarks and the end-to-end demo.

use herald_core::{Message, NoopSink, PubSub, PubSubConfig, Result};
use herald_transport::MemoryBroker;
use std::sync::Arc;

/// Topic every benchmark publishes to.
pub const ORDERS_TOPIC: &str = "v1.orders.process";

/// Connect a backend named `name` to `broker` without metrics.
///
/// # Errors
///
/// Returns an error if the backend fails its health check.
pub async fn memory_backend(
    name: &str,
    broker: &MemoryBroker,
    config: PubSubConfig,
) -> Result<PubSub> {
    PubSub::connect(name, broker.connect_transport(name), config, Arc::new(NoopSink)).await
}

/// Build `n` order messages.
#[must_use]
pub fn orders(n: usize) -> Vec<Message> {
    (0..n)
        .filter_map(|i| {
            Message::new(ORDERS_TOPIC, serde_json::json!({"order": i, "sku": "sku-123"})).ok()
        })
        .collect()
}
