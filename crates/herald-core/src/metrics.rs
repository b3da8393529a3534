//! Operation counters for Herald.
//!
//! The core reports through an injected [`MetricsSink`]. [`RecorderSink`]
//! forwards to the `metrics` crate facade, so any installed recorder
//! (Prometheus, statsd, ...) picks the counters up.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter names, without prefix.
pub mod names {
    pub const INSTANTIATION_FAILED: &str = "instantiation.failed";
    pub const PUBLISHED: &str = "published";
    pub const PUBLISHED_FAILED: &str = "published.failed";
    pub const SUBSCRIBED: &str = "subscribed";
    pub const SUBSCRIBED_FAILED: &str = "subscribed.failed";
    pub const UNSUBSCRIBED: &str = "unsubscribed";
    pub const UNSUBSCRIBED_FAILED: &str = "unsubscribed.failed";
}

/// Counters reported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Health check on construction failed.
    InstantiationFailed,
    /// A publish batch completed without failures.
    Published,
    /// A message failed to publish.
    PublishedFailed,
    /// A subscribe batch completed without failures.
    Subscribed,
    /// A subscription failed to register, or an inbound envelope failed to decode.
    SubscribedFailed,
    /// A subscription was removed.
    Unsubscribed,
    /// A subscription failed to unregister.
    UnsubscribedFailed,
}

impl Counter {
    /// All counters.
    pub const ALL: [Counter; 7] = [
        Counter::InstantiationFailed,
        Counter::Published,
        Counter::PublishedFailed,
        Counter::Subscribed,
        Counter::SubscribedFailed,
        Counter::Unsubscribed,
        Counter::UnsubscribedFailed,
    ];

    /// Counter name, without prefix.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstantiationFailed => names::INSTANTIATION_FAILED,
            Self::Published => names::PUBLISHED,
            Self::PublishedFailed => names::PUBLISHED_FAILED,
            Self::Subscribed => names::SUBSCRIBED,
            Self::SubscribedFailed => names::SUBSCRIBED_FAILED,
            Self::Unsubscribed => names::UNSUBSCRIBED,
            Self::UnsubscribedFailed => names::UNSUBSCRIBED_FAILED,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::InstantiationFailed => "Backends that failed their construction health check",
            Self::Published => "Publish batches completed without failures",
            Self::PublishedFailed => "Messages that failed to publish",
            Self::Subscribed => "Subscribe batches completed without failures",
            Self::SubscribedFailed => "Subscriptions that failed to register or decode",
            Self::Unsubscribed => "Subscriptions removed",
            Self::UnsubscribedFailed => "Subscriptions that failed to unregister",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for core counters.
pub trait MetricsSink: Send + Sync {
    /// Add `value` to `counter` for `backend`.
    fn increment(&self, backend: &str, counter: Counter, value: u64);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment(&self, _backend: &str, _counter: Counter, _value: u64) {}
}

/// Forwards counters to the `metrics` facade with a `backend` label.
#[derive(Debug, Clone)]
pub struct RecorderSink {
    prefix: String,
}

impl RecorderSink {
    /// Create a sink whose counters are named `{prefix}.{counter}`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Full name of `counter`.
    #[must_use]
    pub fn metric_name(&self, counter: Counter) -> String {
        if self.prefix.is_empty() {
            counter.name().to_string()
        } else {
            format!("{}.{}", self.prefix, counter.name())
        }
    }

    /// Register counter descriptions with the installed recorder.
    pub fn describe(&self) {
        for counter in Counter::ALL {
            ::metrics::describe_counter!(self.metric_name(counter), counter.description());
        }
    }
}

impl MetricsSink for RecorderSink {
    fn increment(&self, backend: &str, counter: Counter, value: u64) {
        ::metrics::counter!(self.metric_name(counter), "backend" => backend.to_string())
            .increment(value);
    }
}

/// Counter table kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryCounters {
    counters: DashMap<(String, Counter), AtomicU64>,
}

impl InMemoryCounters {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `counter` for `backend`.
    #[must_use]
    pub fn get(&self, backend: &str, counter: Counter) -> u64 {
        self.counters
            .get(&(backend.to_string(), counter))
            .map_or(0, |v| v.load(Ordering::Relaxed))
    }

    /// Sum of `counter` across backends.
    #[must_use]
    pub fn total(&self, counter: Counter) -> u64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().1 == counter)
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }
}

impl MetricsSink for InMemoryCounters {
    fn increment(&self, backend: &str, counter: Counter, value: u64) {
        self.counters
            .entry((backend.to_string(), counter))
            .or_default()
            .fetch_add(value, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_counters() {
        let counters = InMemoryCounters::new();
        counters.increment("nats", Counter::Published, 1);
        counters.increment("nats", Counter::Published, 2);
        counters.increment("kafka", Counter::Published, 1);
        counters.increment("nats", Counter::PublishedFailed, 4);

        assert_eq!(counters.get("nats", Counter::Published), 3);
        assert_eq!(counters.get("kafka", Counter::Subscribed), 0);
        assert_eq!(counters.total(Counter::Published), 4);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Counter::InstantiationFailed.to_string(), "instantiation.failed");
        assert_eq!(
            RecorderSink::new("herald").metric_name(Counter::SubscribedFailed),
            "herald.subscribed.failed"
        );
        assert_eq!(RecorderSink::new("").metric_name(Counter::Published), "published");
        assert_eq!(Counter::UnsubscribedFailed.name(), "unsubscribed.failed");
    }

    #[test]
    fn test_recorder_without_recorder_installed() {
        // No global recorder: calls are no-ops.
        let sink = RecorderSink::new("herald");
        sink.describe();
        sink.increment("memory", Counter::Published, 1);
        NoopSink.increment("memory", Counter::Published, 1);
    }
}
