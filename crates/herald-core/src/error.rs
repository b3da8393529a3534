//! Error types for Herald.

use herald_protocol::{InvalidName, ProtocolError};
use herald_transport::TransportError;
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for Herald operations.
pub type Result<T, E = HeraldError> = std::result::Result<T, E>;

/// Errors raised by the pub/sub core.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Topic or queue violates the naming grammar.
    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    /// Malformed message, subscription, or options.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested mode is not supported.
    #[error("{operation} is not implemented{}", describe(.topic, .id))]
    NotImplemented {
        operation: &'static str,
        topic: String,
        id: String,
    },

    /// Broker call failed.
    #[error("Failed to {operation} on {backend}{}: {source}", describe(.topic, .id))]
    Transport {
        backend: String,
        operation: &'static str,
        topic: String,
        id: String,
        #[source]
        source: TransportError,
    },

    /// Payload could not be serialized.
    #[error("Failed to encode payload: {0}")]
    Encode(#[source] ProtocolError),

    /// Payload could not be deserialized.
    #[error("Failed to decode payload: {0}")]
    Decode(#[source] ProtocolError),

    /// No backend registered under that name.
    #[error("No pubsub registered under {0:?}")]
    NilClient(String),

    /// Health check on construction never succeeded.
    #[error("Ping failed on {backend} after {attempts} attempts: {source}")]
    PingFailed {
        backend: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Subscription has no live registration on this backend.
    #[error("Not subscribed on {backend}{}", describe(.topic, .id))]
    NotSubscribed {
        backend: String,
        topic: String,
        id: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn describe(topic: &str, id: &str) -> String {
    match (topic.is_empty(), id.is_empty()) {
        (true, true) => String::new(),
        (false, true) => format!(" (topic: {topic})"),
        (true, false) => format!(" (id: {id})"),
        (false, false) => format!(" (topic: {topic}, id: {id})"),
    }
}

impl From<ProtocolError> for HeraldError {
    fn from(err: ProtocolError) -> Self {
        if err.is_encode() {
            Self::Encode(err)
        } else {
            Self::Decode(err)
        }
    }
}

impl HeraldError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Topic the failed item was addressed to, if known.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::NotImplemented { topic, .. }
            | Self::Transport { topic, .. }
            | Self::NotSubscribed { topic, .. }
                if !topic.is_empty() =>
            {
                Some(topic.as_str())
            }
            _ => None,
        }
    }

    /// Identifier of the failed item, if known.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::NotImplemented { id, .. }
            | Self::Transport { id, .. }
            | Self::NotSubscribed { id, .. }
                if !id.is_empty() =>
            {
                Some(id.as_str())
            }
            _ => None,
        }
    }

    /// Get the error category for metrics and logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid_name",
            Self::Validation(_) => "validation",
            Self::NotImplemented { .. } => "not_implemented",
            Self::Transport { .. } => "transport",
            Self::Encode(_) => "encode",
            Self::Decode(_) => "decode",
            Self::NilClient(_) => "nil_client",
            Self::PingFailed { .. } => "ping_failed",
            Self::NotSubscribed { .. } => "not_subscribed",
            Self::Config(_) => "config",
        }
    }
}

/// Ordered collection of per-item errors.
#[derive(Debug, Default)]
pub struct Errors(Vec<HeraldError>);

impl Errors {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error.
    pub fn push(&mut self, error: HeraldError) {
        self.0.push(error);
    }

    /// Number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the errors.
    pub fn iter(&self) -> std::slice::Iter<'_, HeraldError> {
        self.0.iter()
    }

    /// Consume the collection, returning the inner vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<HeraldError> {
        self.0
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

impl From<HeraldError> for Errors {
    fn from(error: HeraldError) -> Self {
        Self(vec![error])
    }
}

impl FromIterator<HeraldError> for Errors {
    fn from_iter<I: IntoIterator<Item = HeraldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<HeraldError> for Errors {
    fn extend<I: IntoIterator<Item = HeraldError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Errors {
    type Item = HeraldError;
    type IntoIter = std::vec::IntoIter<HeraldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a HeraldError;
    type IntoIter = std::slice::Iter<'a, HeraldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
