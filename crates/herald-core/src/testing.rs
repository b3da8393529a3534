//! Fake transports for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use herald_transport::{
    MemoryBroker, MemoryTransport, MessageCallback, SubscriptionHandle, Transport, TransportError,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A memory transport with injectable failures.
pub(crate) struct FakeTransport {
    inner: Arc<MemoryTransport>,
    failing_topics: Mutex<HashSet<String>>,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    hang_publish: AtomicBool,
    flush_failures: AtomicU32,
    pub publishes: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new(broker: &MemoryBroker) -> Arc<Self> {
        Arc::new(Self {
            inner: broker.connect_transport("fake"),
            failing_topics: Mutex::new(HashSet::new()),
            fail_subscribe: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            hang_publish: AtomicBool::new(false),
            flush_failures: AtomicU32::new(0),
            publishes: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    /// Publishing to `topic` fails.
    pub(crate) fn fail_publish_to(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    /// Every registration fails.
    pub(crate) fn fail_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    /// Every unregistration fails.
    pub(crate) fn fail_unsubscribe(&self) {
        self.fail_unsubscribe.store(true, Ordering::SeqCst);
    }

    /// Publishing never completes.
    pub(crate) fn hang_publish(&self) {
        self.hang_publish.store(true, Ordering::SeqCst);
    }

    /// The next `n` flushes fail.
    pub(crate) fn fail_flushes(&self, n: u32) {
        self.flush_failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.inner.subscription_count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if self.hang_publish.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let rejected = self.failing_topics.lock().unwrap().contains(topic);
        if rejected {
            return Err(TransportError::PublishFailed(format!("{topic} rejected")));
        }
        self.inner.publish(topic, payload).await
    }

    async fn queue_subscribe(
        &self,
        topic: &str,
        queue: &str,
        on_message: MessageCallback,
    ) -> Result<SubscriptionHandle, TransportError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::SubscribeFailed(format!("{queue} rejected")));
        }
        self.inner.queue_subscribe(topic, queue, on_message).await
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Other(format!("{handle} still registered")));
        }
        self.inner.unsubscribe(handle).await
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.flush_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.flush_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::FlushFailed("broker unavailable".into()));
        }
        self.inner.flush().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
