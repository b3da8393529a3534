//! # herald-core
//!
//! Backend-agnostic publish/subscribe for Herald.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Message** / **Subscription** - validated entities addressed by name
//! - **PubSub** - concurrent fan-out of batches onto one transport
//! - **Registry** - the same batches repeated across every named backend
//! - **Batch** - partial success: every item back, plus one error per failure
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Caller    │────▶│  Registry   │────▶│   PubSub    │────▶│  Transport  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │                   │
//!                                                ▼                   ▼
//!                                         ┌─────────────┐     ┌─────────────┐
//!                                         │ MetricsSink │     │ Subscription│
//!                                         └─────────────┘     │ handler+chan│
//!                                                             └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use herald_core::{Context, Message, PubSub, PubSubConfig, Subscription};
//!
//! let pubsub = PubSub::connect("primary", transport, PubSubConfig::default(), sink).await?;
//!
//! let sub = Subscription::new("v1.orders.process", "v1.orders.process", |m: &Message| {
//!     tracing::info!(id = %m.id(), "order received");
//! })?;
//! let mut rx = sub.take_receiver().unwrap();
//! pubsub.subscribe(&Context::new(), vec![sub], &[]).await.into_result()?;
//!
//! let msg = Message::new("v1.orders.process", serde_json::json!({"order": 42}))?;
//! let batch = pubsub.publish(&Context::new(), vec![msg], &[]).await;
//! ```

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod metadata;
pub mod metrics;
pub mod must;
pub mod options;
pub mod pubsub;
pub mod registry;
pub mod retry;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use batch::Batch;
pub use config::{BackendConfig, ConfigError, HealthCheckConfig, HeraldConfig, MetricsConfig, PubSubConfig};
pub use context::Context;
pub use error::{Errors, HeraldError, Result};
pub use message::{Message, Payload};
pub use metadata::{Metadata, Status};
pub use crate::metrics::{Counter, InMemoryCounters, MetricsSink, NoopSink, RecorderSink};
pub use options::{with_sync, with_timeout, OptionFn, Options};
pub use pubsub::PubSub;
pub use registry::Registry;
pub use retry::RetryPolicy;
pub use subscription::{Handler, Receiver, Subscription};

pub use herald_protocol::{Name, Queue, Topic, WireFormat};
