//! The fan-out engine for one backend.
//!
//! Every batch item is processed as its own future. Items never abort their
//! siblings: each one ends up in the returned [`Batch`] with its status
//! advanced, and each failure adds one entry to the batch errors.

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use herald_transport::{callback, MessageCallback, SubscriptionHandle, Transport, TransportError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::batch::Batch;
use crate::config::PubSubConfig;
use crate::context::Context;
use crate::error::{HeraldError, Result};
use crate::message::{Message, Payload};
use crate::metadata::Status;
use crate::metrics::{Counter, MetricsSink};
use crate::options::{OptionFn, Options};
use crate::subscription::Subscription;

/// A named backend: one transport plus the fan-out engine around it.
pub struct PubSub {
    name: String,
    transport: Arc<dyn Transport>,
    config: PubSubConfig,
    metrics: Arc<dyn MetricsSink>,
    /// subscription id -> transport registrations
    registrations: DashMap<String, Vec<SubscriptionHandle>>,
    closed: AtomicBool,
}

impl PubSub {
    /// Build a backend over `transport`.
    ///
    /// The transport is flushed first, retrying with exponential backoff as
    /// configured in `config.health_check`.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::Validation`] for an empty name and
    /// [`HeraldError::PingFailed`] if no flush succeeds.
    pub async fn connect(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: PubSubConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(HeraldError::validation("backend name is empty"));
        }

        let span = info_span!("connect", backend = %name, kind = transport.name());
        async move {
            let policy = config.health_check.policy();
            if let Err(exhausted) = policy.run("flush", || transport.flush()).await {
                metrics.increment(&name, Counter::InstantiationFailed, 1);
                return Err(HeraldError::PingFailed {
                    backend: name,
                    attempts: exhausted.attempts,
                    source: exhausted.last_error,
                });
            }

            info!(
                max_concurrency = ?config.max_concurrency,
                wire_format = %config.wire_format,
                "PubSub connected"
            );
            Ok(Self {
                name,
                transport,
                config,
                metrics,
                registrations: DashMap::new(),
                closed: AtomicBool::new(false),
            })
        }
        .instrument(span)
        .await
    }

    /// Backend name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport kind, e.g. `"memory"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.transport.name()
    }

    /// Whether [`PubSub::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    /// Number of subscriptions with live registrations.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registrations.len()
    }

    /// Publish a batch of messages.
    ///
    /// Returns every message, in input order, with status
    /// [`Status::Published`] or [`Status::Failed`].
    pub async fn publish<T: Payload>(
        &self,
        ctx: &Context,
        messages: Vec<Message<T>>,
        opts: &[OptionFn],
    ) -> Batch<Message<T>> {
        let span = info_span!(
            "publish",
            backend = %self.name,
            count = messages.len(),
            outcome = tracing::field::Empty
        );
        let limit = self.concurrency(messages.len());

        async move {
            let results = stream::iter(messages.into_iter().map(|mut message| async move {
                let outcome = self.publish_one(ctx, &message, opts).await;
                match outcome {
                    Ok(()) => message.set_status(Status::Published),
                    Err(_) => message.set_status(Status::Failed),
                }
                (message, outcome.err())
            }))
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

            self.collect("publish", results, Some(Counter::Published), Counter::PublishedFailed)
        }
        .instrument(span)
        .await
    }

    async fn publish_one<T: Payload>(
        &self,
        ctx: &Context,
        message: &Message<T>,
        opts: &[OptionFn],
    ) -> Result<()> {
        message.validate()?;
        let options = Options::from_fns(opts)?;
        if options.sync {
            return Err(HeraldError::NotImplemented {
                operation: "synchronous publish",
                topic: message.topic().to_string(),
                id: message.id().to_string(),
            });
        }

        let payload = message.encode(self.config.wire_format)?;
        self.call(ctx, options, "publish", message.topic(), message.id(), |t| {
            t.publish(message.topic(), payload)
        })
        .await?;

        debug!(topic = %message.topic(), id = %message.id(), "Message published");
        Ok(())
    }

    /// Register a batch of subscriptions.
    ///
    /// Returns every subscription, in input order, with status
    /// [`Status::Subscribed`] or [`Status::Failed`]. When the transport rejects
    /// a registration, the channel is closed unless another registration of
    /// the same subscription, on any backend, still feeds it. A subscription
    /// whose channel is closed is rejected with [`HeraldError::Validation`].
    pub async fn subscribe<T: Payload>(
        &self,
        ctx: &Context,
        subscriptions: Vec<Subscription<T>>,
        opts: &[OptionFn],
    ) -> Batch<Subscription<T>> {
        let span = info_span!(
            "subscribe",
            backend = %self.name,
            count = subscriptions.len(),
            outcome = tracing::field::Empty
        );
        let limit = self.concurrency(subscriptions.len());

        async move {
            let results = stream::iter(subscriptions.into_iter().map(|mut subscription| async move {
                let outcome = self.subscribe_one(ctx, &subscription, opts).await;
                match outcome {
                    Ok(()) => subscription.set_status(Status::Subscribed),
                    Err(_) => subscription.set_status(Status::Failed),
                }
                (subscription, outcome.err())
            }))
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

            self.collect("subscribe", results, Some(Counter::Subscribed), Counter::SubscribedFailed)
        }
        .instrument(span)
        .await
    }

    async fn subscribe_one<T: Payload>(
        &self,
        ctx: &Context,
        subscription: &Subscription<T>,
        opts: &[OptionFn],
    ) -> Result<()> {
        subscription.validate()?;
        let options = Options::from_fns(opts)?;
        let topic = subscription.topic().as_str();
        if options.sync {
            return Err(HeraldError::NotImplemented {
                operation: "synchronous subscribe",
                topic: topic.to_string(),
                id: subscription.id().to_string(),
            });
        }

        if !subscription.begin_registration() {
            return Err(HeraldError::validation(format!(
                "subscription {} has a closed channel and cannot be registered again",
                subscription.id()
            )));
        }

        let on_message = self.dispatcher(subscription.clone());
        let registered = self
            .call(ctx, options, "subscribe", topic, subscription.id(), |t| {
                t.queue_subscribe(topic, subscription.queue().as_str(), on_message)
            })
            .await;

        match registered {
            Ok(handle) => {
                debug!(topic = %topic, id = %subscription.id(), registration = %handle, "Subscribed");
                self.registrations
                    .entry(subscription.id().to_string())
                    .or_default()
                    .push(handle);
                Ok(())
            }
            Err(e) => {
                if subscription.abandon_registration() {
                    debug!(topic = %topic, id = %subscription.id(), "Subscription channel closed");
                }
                Err(e)
            }
        }
    }

    /// Callback that turns inbound payloads into deliveries on `subscription`.
    fn dispatcher<T: Payload>(&self, subscription: Subscription<T>) -> MessageCallback {
        let subscription = Arc::new(subscription);
        let backend: Arc<str> = Arc::from(self.name.as_str());
        let metrics = Arc::clone(&self.metrics);
        let format = self.config.wire_format;

        callback(move |payload: Bytes| {
            let subscription = Arc::clone(&subscription);
            let backend = Arc::clone(&backend);
            let metrics = Arc::clone(&metrics);
            async move {
                match Message::<T>::decode(&payload, format) {
                    Ok(message) => subscription.deliver(message).await,
                    Err(e) => {
                        metrics.increment(&backend, Counter::SubscribedFailed, 1);
                        error!(
                            backend = %backend,
                            subscription = %subscription.id(),
                            error = %e,
                            "Failed to decode inbound message"
                        );
                    }
                }
            }
        })
    }

    /// Remove the registrations made for a batch of subscriptions.
    ///
    /// Returns every subscription, in input order, with status
    /// [`Status::Unsubscribed`] or [`Status::Failed`].
    pub async fn unsubscribe<T: Payload>(
        &self,
        ctx: &Context,
        subscriptions: Vec<Subscription<T>>,
    ) -> Batch<Subscription<T>> {
        let span = info_span!(
            "unsubscribe",
            backend = %self.name,
            count = subscriptions.len(),
            outcome = tracing::field::Empty
        );
        let limit = self.concurrency(subscriptions.len());

        async move {
            let results = stream::iter(subscriptions.into_iter().map(|mut subscription| async move {
                let outcome = self.unsubscribe_one(ctx, &subscription).await;
                match outcome {
                    Ok(()) => subscription.set_status(Status::Unsubscribed),
                    Err(_) => subscription.set_status(Status::Failed),
                }
                (subscription, outcome.err())
            }))
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

            let batch = self.collect("unsubscribe", results, None, Counter::UnsubscribedFailed);
            let removed = batch.len() - batch.errors.len();
            if removed > 0 {
                self.metrics
                    .increment(&self.name, Counter::Unsubscribed, removed as u64);
            }
            batch
        }
        .instrument(span)
        .await
    }

    async fn unsubscribe_one<T: Payload>(
        &self,
        ctx: &Context,
        subscription: &Subscription<T>,
    ) -> Result<()> {
        let topic = subscription.topic().as_str();
        let Some((id, handles)) = self.registrations.remove(subscription.id()) else {
            return Err(HeraldError::NotSubscribed {
                backend: self.name.clone(),
                topic: topic.to_string(),
                id: subscription.id().to_string(),
            });
        };

        let registered = handles.len();
        let mut remaining = Vec::new();
        let mut first_error = None;
        for handle in handles {
            let removed = self
                .call(ctx, Options::default(), "unsubscribe", topic, &id, |t| {
                    t.unsubscribe(&handle)
                })
                .await;
            if let Err(e) = removed {
                first_error.get_or_insert(e);
                remaining.push(handle);
            }
        }

        subscription.end_registrations(registered - remaining.len());

        match first_error {
            None => {
                debug!(topic = %topic, id = %id, "Unsubscribed");
                Ok(())
            }
            Some(e) => {
                // Keep what is still registered so a later call can retry it.
                self.registrations.insert(id, remaining);
                Err(e)
            }
        }
    }

    /// Close the transport.
    ///
    /// Only the first call reaches the transport; later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::Transport`] if the transport fails to close.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(backend = %self.name, "PubSub already closed");
            return Ok(());
        }

        self.registrations.clear();
        self.transport
            .close()
            .await
            .map_err(|source| self.transport_error("close", "", "", source))?;

        info!(backend = %self.name, "PubSub closed");
        Ok(())
    }

    fn concurrency(&self, items: usize) -> usize {
        self.config.max_concurrency.unwrap_or(items).max(1)
    }

    /// Run one transport call under the context and per-call timeout.
    async fn call<'a, R, F, Fut>(
        &'a self,
        ctx: &Context,
        options: Options,
        operation: &'static str,
        topic: &str,
        id: &str,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(&'a dyn Transport) -> Fut,
        Fut: Future<Output = std::result::Result<R, TransportError>>,
    {
        if self.is_closed() {
            return Err(self.transport_error(operation, topic, id, TransportError::ConnectionClosed));
        }
        ctx.run(options.timeout, f(self.transport.as_ref()))
            .await
            .map_err(|source| self.transport_error(operation, topic, id, source))
    }

    fn transport_error(
        &self,
        operation: &'static str,
        topic: &str,
        id: &str,
        source: TransportError,
    ) -> HeraldError {
        HeraldError::Transport {
            backend: self.name.clone(),
            operation,
            topic: topic.to_string(),
            id: id.to_string(),
            source,
        }
    }

    /// Fold per-item outcomes into a batch, reporting counters and logs.
    fn collect<I>(
        &self,
        operation: &'static str,
        results: Vec<(I, Option<HeraldError>)>,
        succeeded: Option<Counter>,
        failed: Counter,
    ) -> Batch<I> {
        let mut batch = Batch::default();
        for (item, err) in results {
            if let Some(err) = err {
                self.metrics.increment(&self.name, failed, 1);
                warn!(
                    topic = err.topic().unwrap_or_default(),
                    id = err.id().unwrap_or_default(),
                    category = err.category(),
                    error = %err,
                    "{operation} failed"
                );
                batch.errors.push(err);
            }
            batch.items.push(item);
        }

        let outcome = if batch.is_ok() {
            if let Some(counter) = succeeded {
                self.metrics.increment(&self.name, counter, 1);
            }
            "ok"
        } else if batch.errors.len() == batch.items.len() {
            "failed"
        } else {
            "partial"
        };
        Span::current().record("outcome", outcome);

        if !batch.is_ok() {
            error!(
                failed = batch.errors.len(),
                total = batch.items.len(),
                errors = %batch.errors,
                "{operation} batch finished with errors"
            );
        }
        batch
    }
}

impl std::fmt::Debug for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSub")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("subscriptions", &self.registrations.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
