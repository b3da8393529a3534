//! In-memory broker transport.
//!
//! [`MemoryBroker`] routes payloads between [`MemoryTransport`] connections in
//! the same process. Every queue group on a topic receives a copy of each
//! payload, and one member of the group is picked round-robin to handle it.

use crate::traits::{Connector, MessageCallback, SubscriptionHandle, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Address scheme accepted by [`MemoryBroker::connect`].
pub const MEMORY_SCHEME: &str = "memory://";

/// A queue group member.
struct Member {
    handle_id: u64,
    sender: mpsc::UnboundedSender<Bytes>,
}

/// Members of one queue group.
#[derive(Default)]
struct QueueGroup {
    members: Vec<Member>,
    next: AtomicUsize,
}

impl QueueGroup {
    /// Hand the payload to one live member, round-robin.
    fn deliver(&self, payload: &Bytes) -> bool {
        let len = self.members.len();
        if len == 0 {
            return false;
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        (0..len).any(|offset| {
            let member = &self.members[(start + offset) % len];
            member.sender.send(payload.clone()).is_ok()
        })
    }
}

#[derive(Default)]
struct BrokerInner {
    /// topic -> queue -> group
    topics: DashMap<String, DashMap<String, QueueGroup>>,
    published: AtomicU64,
    delivered: AtomicU64,
    next_connection: AtomicU64,
}

/// An in-process broker shared by any number of [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create a new, empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection to this broker.
    #[must_use]
    pub fn connect_transport(&self, label: impl Into<String>) -> Arc<MemoryTransport> {
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let transport = MemoryTransport {
            id,
            label: label.into(),
            broker: self.clone(),
            closed: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            subscriptions: DashMap::new(),
        };
        debug!(connection = id, label = %transport.label, "Memory transport connected");
        Arc::new(transport)
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            topic_count: self.inner.topics.len(),
            group_count: self.inner.topics.iter().map(|t| t.len()).sum(),
            member_count: self
                .inner
                .topics
                .iter()
                .map(|t| t.iter().map(|g| g.members.len()).sum::<usize>())
                .sum(),
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
        }
    }

    fn route(&self, topic: &str, payload: Bytes) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let Some(groups) = self.inner.topics.get(topic) else {
            trace!(topic = %topic, "Publish to topic without subscribers");
            return 0;
        };

        let delivered = groups.iter().filter(|g| g.deliver(&payload)).count();
        self.inner
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        trace!(topic = %topic, groups = delivered, "Routed payload");
        delivered
    }

    fn join(&self, topic: &str, queue: &str, member: Member) {
        let groups = self.inner.topics.entry(topic.to_string()).or_default();
        groups
            .entry(queue.to_string())
            .or_default()
            .members
            .push(member);
    }

    fn leave(&self, topic: &str, queue: &str, handle_id: u64) -> bool {
        let mut removed = false;
        let mut topic_empty = false;

        if let Some(groups) = self.inner.topics.get(topic) {
            let mut group_empty = false;
            if let Some(mut group) = groups.get_mut(queue) {
                let before = group.members.len();
                group.members.retain(|m| m.handle_id != handle_id);
                removed = group.members.len() != before;
                group_empty = group.members.is_empty();
            }
            if group_empty {
                groups.remove(queue);
            }
            topic_empty = groups.is_empty();
        }

        if topic_empty {
            self.inner
                .topics
                .remove_if(topic, |_, groups| groups.is_empty());
            debug!(topic = %topic, "Deleted empty topic");
        }

        removed
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Transport>, TransportError> {
        let label = address
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))?;
        Ok(self.connect_transport(label))
    }
}

/// Broker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Number of topics with at least one subscriber.
    pub topic_count: usize,
    /// Number of queue groups across all topics.
    pub group_count: usize,
    /// Number of registered members.
    pub member_count: usize,
    /// Payloads published.
    pub published: u64,
    /// Group deliveries performed.
    pub delivered: u64,
}

struct Registration {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// A connection to a [`MemoryBroker`].
pub struct MemoryTransport {
    id: u64,
    label: String,
    broker: MemoryBroker,
    closed: AtomicBool,
    healthy: AtomicBool,
    subscriptions: DashMap<u64, Registration>,
}

impl MemoryTransport {
    /// Connection identifier, unique within its broker.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Label the connection was opened with.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of live registrations on this connection.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Mark the connection healthy or not; an unhealthy connection fails `flush`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn drop_registration(&self, registration: Registration) {
        registration.task.abort();
        self.broker.leave(
            registration.handle.topic(),
            registration.handle.queue(),
            registration.handle.id(),
        );
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.broker.route(topic, payload);
        Ok(())
    }

    async fn queue_subscribe(
        &self,
        topic: &str,
        queue: &str,
        on_message: MessageCallback,
    ) -> Result<SubscriptionHandle, TransportError> {
        self.ensure_open()?;

        let handle = SubscriptionHandle::new(topic, queue);
        let (sender, mut receiver) = mpsc::unbounded_channel::<Bytes>();

        let task = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                on_message(payload).await;
            }
        });

        self.broker.join(
            topic,
            queue,
            Member {
                handle_id: handle.id(),
                sender,
            },
        );
        self.subscriptions.insert(
            handle.id(),
            Registration {
                handle: handle.clone(),
                task,
            },
        );

        debug!(connection = self.id, subscription = %handle, "Queue subscribed");
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        let (_, registration) = self
            .subscriptions
            .remove(&handle.id())
            .ok_or_else(|| TransportError::UnknownSubscription(handle.to_string()))?;
        self.drop_registration(registration);
        debug!(connection = self.id, subscription = %handle, "Unsubscribed");
        Ok(())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(TransportError::FlushFailed(format!(
                "memory connection {} is unhealthy",
                self.id
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!(connection = self.id, "Memory transport already closed");
            return Ok(());
        }

        let ids: Vec<u64> = self.subscriptions.iter().map(|r| *r.key()).collect();
        for id in ids {
            if let Some((_, registration)) = self.subscriptions.remove(&id) {
                self.drop_registration(registration);
            }
        }

        info!(connection = self.id, label = %self.label, "Memory transport closed");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.healthy.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().task.abort();
            self.broker
                .leave(entry.handle.topic(), entry.handle.queue(), entry.handle.id());
        }
    }
}
