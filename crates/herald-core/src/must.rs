//! Fatal-on-error wrappers for process edges.
//!
//! Startup code that cannot continue without its publications or
//! subscriptions in place can use these instead of inspecting a [`Batch`].
//! Each one panics with the collected errors if any item fails.
//!
//! [`Batch`]: crate::Batch

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::message::{Message, Payload};
use crate::options::OptionFn;
use crate::pubsub::PubSub;
use crate::registry::Registry;
use crate::subscription::Subscription;

/// Publish on one backend, panicking on any failure.
///
/// # Panics
///
/// Panics if any message fails to publish.
pub async fn must_publish<T: Payload>(
    pubsub: &PubSub,
    ctx: &Context,
    messages: Vec<Message<T>>,
    opts: &[OptionFn],
) -> Vec<Message<T>> {
    match pubsub.publish(ctx, messages, opts).await.into_result() {
        Ok(items) => items,
        Err(errors) => panic!("publish on {} failed: {errors}", pubsub.name()),
    }
}

/// Subscribe on one backend, panicking on any failure.
///
/// # Panics
///
/// Panics if any subscription fails to register.
pub async fn must_subscribe<T: Payload>(
    pubsub: &PubSub,
    ctx: &Context,
    subscriptions: Vec<Subscription<T>>,
    opts: &[OptionFn],
) -> Vec<Subscription<T>> {
    match pubsub.subscribe(ctx, subscriptions, opts).await.into_result() {
        Ok(items) => items,
        Err(errors) => panic!("subscribe on {} failed: {errors}", pubsub.name()),
    }
}

/// [`must_publish`] from a detached task.
pub fn must_publish_async<T: Payload>(
    pubsub: Arc<PubSub>,
    ctx: Context,
    messages: Vec<Message<T>>,
    opts: Vec<OptionFn>,
) -> JoinHandle<Vec<Message<T>>> {
    tokio::spawn(async move { must_publish(&pubsub, &ctx, messages, &opts).await })
}

/// [`must_subscribe`] from a detached task.
pub fn must_subscribe_async<T: Payload>(
    pubsub: Arc<PubSub>,
    ctx: Context,
    subscriptions: Vec<Subscription<T>>,
    opts: Vec<OptionFn>,
) -> JoinHandle<Vec<Subscription<T>>> {
    tokio::spawn(async move { must_subscribe(&pubsub, &ctx, subscriptions, &opts).await })
}

/// Publish on every backend of `registry`, panicking on any failure.
///
/// # Panics
///
/// Panics if any message fails on any backend.
pub async fn must_publish_many<T: Payload>(
    registry: &Registry,
    ctx: &Context,
    messages: &[Message<T>],
    opts: &[OptionFn],
) -> Vec<Message<T>> {
    match registry.publish_many(ctx, messages, opts).await.into_result() {
        Ok(items) => items,
        Err(errors) => panic!("publish_many failed: {errors}"),
    }
}

/// Subscribe on every backend of `registry`, panicking on any failure.
///
/// # Panics
///
/// Panics if any subscription fails on any backend.
pub async fn must_subscribe_many<T: Payload>(
    registry: &Registry,
    ctx: &Context,
    subscriptions: &[Subscription<T>],
    opts: &[OptionFn],
) -> Vec<Subscription<T>> {
    match registry
        .subscribe_many(ctx, subscriptions, opts)
        .await
        .into_result()
    {
        Ok(items) => items,
        Err(errors) => panic!("subscribe_many failed: {errors}"),
    }
}
