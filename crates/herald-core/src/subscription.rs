//! Subscriptions and their delivery sinks.
//!
//! A subscription delivers every inbound message twice: first to its handler,
//! then to its channel. The channel holds at most one message, so a consumer
//! that stops reading stalls delivery on that registration.

use herald_protocol::{Name, Queue, Topic};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{HeraldError, Result};
use crate::message::{Message, Payload};
use crate::metadata::{Metadata, Status};

/// Capacity of a subscription channel.
pub const CHANNEL_CAPACITY: usize = 1;

/// Callback invoked for every message delivered to a subscription.
pub type Handler<T = serde_json::Value> = Arc<dyn Fn(&Message<T>) + Send + Sync>;

/// Receiving half of a subscription channel.
pub type Receiver<T = serde_json::Value> = mpsc::Receiver<Message<T>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sending side of the channel, with the registrations feeding it.
struct Sink<T> {
    sender: Option<mpsc::Sender<Message<T>>>,
    /// Registrations that are live or in flight, across every backend.
    registrations: usize,
}

/// Channel shared by every clone of a subscription.
struct Delivery<T> {
    sink: Mutex<Sink<T>>,
    receiver: Mutex<Option<Receiver<T>>>,
}

impl<T> Delivery<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            sink: Mutex::new(Sink {
                sender: Some(tx),
                registrations: 0,
            }),
            receiver: Mutex::new(Some(rx)),
        }
    }
}

/// A request to consume messages from a topic through a queue group.
///
/// Clones share the handler and the channel, so one descriptor can be
/// registered with several backends and still feed a single consumer.
pub struct Subscription<T = serde_json::Value> {
    meta: Metadata,
    topic: Topic,
    queue: Queue,
    handler: Handler<T>,
    delivery: Arc<Delivery<T>>,
}

impl<T: Payload> Subscription<T> {
    /// Create a subscription.
    ///
    /// `topic` is coerced to its topic form and `queue` to its queue form, so
    /// `("v1.orders.process", "v1.orders.process")` subscribes the
    /// `v1.orders.process.queue` group to `v1.orders.process`.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::InvalidName`] if either name is invalid.
    pub fn new<F>(topic: impl Into<String>, queue: impl Into<String>, handler: F) -> Result<Self>
    where
        F: Fn(&Message<T>) + Send + Sync + 'static,
    {
        let topic = Name::new(topic)?.to_topic();
        let queue = Name::new(queue)?.to_queue();

        Ok(Self {
            meta: Metadata::new(topic.as_str(), queue.as_str()),
            topic,
            queue,
            handler: Arc::new(handler),
            delivery: Arc::new(Delivery::new()),
        })
    }

    /// Check the subscription is registrable.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or a name is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.meta.id().is_empty() {
            return Err(HeraldError::validation("subscription id is empty"));
        }
        self.topic.as_name().validate()?;
        self.queue.as_name().validate()?;
        Ok(())
    }

    /// Run the handler, then hand the message to the channel consumer.
    ///
    /// Waits while the channel is full. Once the channel is closed, or its
    /// receiver dropped, only the handler sees the message.
    pub(crate) async fn deliver(&self, message: Message<T>) {
        (self.handler)(&message);

        let sender = lock(&self.delivery.sink).sender.clone();
        if let Some(sender) = sender {
            if sender.send(message).await.is_err() {
                trace!(id = %self.id(), "Subscription receiver dropped");
            }
        }
    }
}

impl<T> Subscription<T> {
    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.meta.id()
    }

    /// Topic the subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Queue group the subscription joins.
    #[must_use]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.meta.status()
    }

    /// Full metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// Take the receiving half of the channel.
    ///
    /// Returns `None` once it has been taken, by this handle or a clone.
    #[must_use]
    pub fn take_receiver(&self) -> Option<Receiver<T>> {
        lock(&self.delivery.receiver).take()
    }

    /// Close the channel.
    ///
    /// Returns `true` for the call that actually closed it; later calls are
    /// no-ops returning `false`.
    pub fn close_channel(&self) -> bool {
        lock(&self.delivery.sink).sender.take().is_some()
    }

    /// Whether the channel has been closed.
    #[must_use]
    pub fn is_channel_closed(&self) -> bool {
        lock(&self.delivery.sink).sender.is_none()
    }

    /// Claim the channel for a registration about to be attempted.
    ///
    /// Returns `false` if the channel is already closed.
    pub(crate) fn begin_registration(&self) -> bool {
        let mut sink = lock(&self.delivery.sink);
        if sink.sender.is_none() {
            return false;
        }
        sink.registrations += 1;
        true
    }

    /// Drop the claim of a registration that failed.
    ///
    /// The channel closes once no other registration, live or in flight,
    /// still feeds it. Returns `true` if this call closed it.
    pub(crate) fn abandon_registration(&self) -> bool {
        let mut sink = lock(&self.delivery.sink);
        sink.registrations = sink.registrations.saturating_sub(1);
        sink.registrations == 0 && sink.sender.take().is_some()
    }

    /// Drop the claims of `count` registrations that were removed.
    pub(crate) fn end_registrations(&self, count: usize) {
        let mut sink = lock(&self.delivery.sink);
        sink.registrations = sink.registrations.saturating_sub(count);
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.meta.transition(status);
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            topic: self.topic.clone(),
            queue: self.queue.clone(),
            handler: Arc::clone(&self.handler),
            delivery: Arc::clone(&self.delivery),
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.meta.id())
            .field("topic", &self.topic.as_str())
            .field("queue", &self.queue.as_str())
            .field("status", &self.meta.status())
            .field("channel_closed", &self.is_channel_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop(_: &Message) {}

    #[test]
    fn test_names_coerced() {
        let sub = Subscription::new("v1.orders.process", "v1.orders.process", noop).unwrap();
        assert_eq!(sub.topic().as_str(), "v1.orders.process");
        assert_eq!(sub.queue().as_str(), "v1.orders.process.queue");
        assert_eq!(sub.metadata().queue(), "v1.orders.process.queue");
        assert_eq!(sub.status(), Status::Created);

        let sub = Subscription::new("v1.orders.process.queue", "v1.orders.process.queue", noop)
            .unwrap();
        assert_eq!(sub.topic().as_str(), "v1.orders.process");
        assert_eq!(sub.queue().as_str(), "v1.orders.process.queue");
    }

    #[test]
    fn test_names_validated_independently() {
        assert!(matches!(
            Subscription::new("v1.orders.process", "orders", noop),
            Err(HeraldError::InvalidName(_))
        ));
        assert!(matches!(
            Subscription::new("bad", "v1.orders.process", noop),
            Err(HeraldError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_dual_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sub = Subscription::new("v1.a.b", "v1.a.b", move |_: &Message| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let mut rx = sub.take_receiver().unwrap();

        let msg = Message::new("v1.a.b", json!({"n": 1})).unwrap();
        sub.deliver(msg.clone()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id(), msg.id());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_channel_once() {
        let sub = Subscription::<Value>::new("v1.a.b", "v1.a.b", |_| {}).unwrap();
        let clone = sub.clone();
        let mut rx = sub.take_receiver().unwrap();
        assert!(clone.take_receiver().is_none());

        assert!(clone.close_channel());
        assert!(!sub.close_channel());
        assert!(sub.is_channel_closed());

        // Reader observes closure instead of blocking forever.
        assert!(rx.recv().await.is_none());

        // Handler still runs; nothing reaches the closed channel.
        sub.deliver(Message::new("v1.a.b", json!(null)).unwrap()).await;
    }

    #[tokio::test]
    async fn test_failed_registration_keeps_channel_while_others_live() {
        let sub = Subscription::<Value>::new("v1.a.b", "v1.a.b", |_| {}).unwrap();
        let sibling = sub.clone();
        let mut rx = sub.take_receiver().unwrap();

        assert!(sub.begin_registration());
        assert!(sibling.begin_registration());
        assert!(!sibling.abandon_registration());
        assert!(!sub.is_channel_closed());

        sub.deliver(Message::new("v1.a.b", json!(1)).unwrap()).await;
        assert!(rx.recv().await.is_some());

        sub.end_registrations(1);
        assert!(sub.begin_registration());
        assert!(sub.abandon_registration());
        assert!(sub.is_channel_closed());
        assert!(!sibling.begin_registration());
    }

    #[tokio::test]
    async fn test_deliver_without_reader() {
        let sub = Subscription::<Value>::new("v1.a.b", "v1.a.b", |_| {}).unwrap();
        drop(sub.take_receiver());
        sub.deliver(Message::new("v1.a.b", json!(1)).unwrap()).await;
    }
}
