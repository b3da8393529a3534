//! Transport abstraction traits for Herald.
//!
//! These traits define the capability set a broker connection must provide,
//! allowing the pub/sub core to stay backend-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Callback invoked by a transport for every inbound payload.
///
/// The returned future is awaited before the next payload on the same
/// subscription is dispatched, so a slow consumer applies backpressure to
/// its own subscription only.
pub type MessageCallback = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`MessageCallback`].
pub fn callback<F, Fut>(f: F) -> MessageCallback
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Handle to a registration made through [`Transport::queue_subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: String,
    queue: String,
}

impl SubscriptionHandle {
    /// Create a handle with a process-unique identifier.
    #[must_use]
    pub fn new(topic: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            id: HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed),
            topic: topic.into(),
            queue: queue.into(),
        }
    }

    /// Unique handle identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Topic the registration listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Queue group of the registration.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}({} -> {})", self.id, self.topic, self.queue)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// Operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Failed to publish.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Failed to register a subscription.
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Registration is unknown to this transport.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// Connectivity probe failed.
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    /// Address could not be used to connect.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A broker connection.
///
/// Implementations must be safe to call concurrently: the core shares one
/// transport across every in-flight publish and subscribe task of a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name (e.g., "memory", "nats").
    fn name(&self) -> &'static str;

    /// Publish an encoded payload to a topic.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Join the `queue` group on `topic`.
    ///
    /// Each payload published to `topic` is delivered to exactly one member of
    /// every queue group. The transport owns `on_message` for as long as the
    /// registration lives.
    async fn queue_subscribe(
        &self,
        topic: &str,
        queue: &str,
        on_message: MessageCallback,
    ) -> Result<SubscriptionHandle, TransportError>;

    /// Drop a registration made through [`Transport::queue_subscribe`].
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError>;

    /// Round-trip to the broker to check the connection is alive.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Check if the transport is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Something that can dial a broker address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `address`.
    async fn connect(&self, address: &str) -> Result<Arc<dyn Transport>, TransportError>;
}
