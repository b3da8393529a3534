//! Named collection of backends.
//!
//! The registry repeats every batch operation on each registered backend
//! concurrently and merges the outcomes. Merged items and errors are grouped
//! by backend, in backend-name order.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use herald_transport::Connector;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

use crate::batch::Batch;
use crate::config::HeraldConfig;
use crate::context::Context;
use crate::error::{Errors, HeraldError, Result};
use crate::message::{Message, Payload};
use crate::metrics::MetricsSink;
use crate::must;
use crate::options::OptionFn;
use crate::pubsub::PubSub;
use crate::subscription::Subscription;

/// Backend name to [`PubSub`] map.
#[derive(Debug, Default)]
pub struct Registry {
    backends: DashMap<String, Arc<PubSub>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every backend listed in `config`.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, connection, or health-check failure.
    pub async fn from_config(
        config: &HeraldConfig,
        connector: &dyn Connector,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Self::new();
        for backend in &config.backends {
            let transport = connector.connect(&backend.address).await.map_err(|source| {
                HeraldError::Transport {
                    backend: backend.name.clone(),
                    operation: "connect",
                    topic: String::new(),
                    id: String::new(),
                    source,
                }
            })?;
            let pubsub = PubSub::connect(
                backend.name.clone(),
                transport,
                config.pubsub.clone(),
                Arc::clone(&metrics),
            )
            .await?;
            registry.register(pubsub)?;
        }

        info!(backends = registry.len(), "Registry ready");
        Ok(registry)
    }

    /// Add a backend under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::Validation`] if the name is taken.
    pub fn register(&self, pubsub: PubSub) -> Result<Arc<PubSub>> {
        match self.backends.entry(pubsub.name().to_string()) {
            Entry::Occupied(entry) => Err(HeraldError::validation(format!(
                "pubsub {:?} is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                let pubsub = Arc::new(pubsub);
                entry.insert(Arc::clone(&pubsub));
                Ok(pubsub)
            }
        }
    }

    /// Look up a backend.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::NilClient`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<PubSub>> {
        self.backends
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HeraldError::NilClient(name.to_string()))
    }

    /// Remove a backend, returning it if it was registered.
    pub fn remove(&self, name: &str) -> Option<Arc<PubSub>> {
        self.backends.remove(name).map(|(_, pubsub)| pubsub)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.backends.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backends sorted by name, detached from the map.
    fn snapshot(&self) -> Vec<Arc<PubSub>> {
        let mut backends: Vec<_> = self.backends.iter().map(|e| Arc::clone(e.value())).collect();
        backends.sort_by(|a, b| a.name().cmp(b.name()));
        backends
    }

    /// Publish `messages` on every backend.
    pub async fn publish_many<T: Payload>(
        &self,
        ctx: &Context,
        messages: &[Message<T>],
        opts: &[OptionFn],
    ) -> Batch<Message<T>> {
        let backends = self.snapshot();
        let span = info_span!("publish_many", backends = backends.len(), count = messages.len());
        join_all(backends.into_iter().map(|pubsub| async move {
            pubsub.publish(ctx, messages.to_vec(), opts).await
        }))
        .instrument(span)
        .await
        .into_iter()
        .collect()
    }

    /// Register `subscriptions` on every backend.
    ///
    /// Clones share their channel, so one consumer reads what every backend
    /// delivers.
    pub async fn subscribe_many<T: Payload>(
        &self,
        ctx: &Context,
        subscriptions: &[Subscription<T>],
        opts: &[OptionFn],
    ) -> Batch<Subscription<T>> {
        let backends = self.snapshot();
        let span = info_span!(
            "subscribe_many",
            backends = backends.len(),
            count = subscriptions.len()
        );
        join_all(backends.into_iter().map(|pubsub| async move {
            pubsub.subscribe(ctx, subscriptions.to_vec(), opts).await
        }))
        .instrument(span)
        .await
        .into_iter()
        .collect()
    }

    /// Remove `subscriptions` from every backend.
    pub async fn unsubscribe_many<T: Payload>(
        &self,
        ctx: &Context,
        subscriptions: &[Subscription<T>],
    ) -> Batch<Subscription<T>> {
        let backends = self.snapshot();
        let span = info_span!(
            "unsubscribe_many",
            backends = backends.len(),
            count = subscriptions.len()
        );
        join_all(backends.into_iter().map(|pubsub| async move {
            pubsub.unsubscribe(ctx, subscriptions.to_vec()).await
        }))
        .instrument(span)
        .await
        .into_iter()
        .collect()
    }

    /// Publish on every backend from a detached task.
    ///
    /// The task panics if any item fails on any backend.
    pub fn must_publish_many_async<T: Payload>(
        self: &Arc<Self>,
        ctx: Context,
        messages: Vec<Message<T>>,
        opts: Vec<OptionFn>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            must::must_publish_many(&registry, &ctx, &messages, &opts).await;
        })
    }

    /// Subscribe on every backend from a detached task.
    ///
    /// The task panics if any registration fails on any backend.
    pub fn must_subscribe_many_async<T: Payload>(
        self: &Arc<Self>,
        ctx: Context,
        subscriptions: Vec<Subscription<T>>,
        opts: Vec<OptionFn>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            must::must_subscribe_many(&registry, &ctx, &subscriptions, &opts).await;
        })
    }

    /// Close every backend.
    ///
    /// # Errors
    ///
    /// Returns the close failures, one per failing backend.
    pub async fn close_all(&self) -> std::result::Result<(), Errors> {
        let closing = self
            .snapshot()
            .into_iter()
            .map(|pubsub| async move { pubsub.close().await });
        let errors: Errors = join_all(closing)
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
