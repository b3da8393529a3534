//! Metadata shared by messages and subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a message or subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Built by a factory, not yet handed to a backend.
    #[default]
    Created,
    /// Accepted by a backend for delivery.
    Published,
    /// Registered with a backend.
    Subscribed,
    /// Registration removed.
    Unsubscribed,
    /// The last operation on the item failed.
    Failed,
}

impl Status {
    /// Status name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Published => "published",
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a unique identifier.
#[must_use]
fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Common fields carried by every entity.
///
/// Only the owning entity mutates its metadata: its factory stamps it, and the
/// pub/sub core advances the status on the items it hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default = "generate_id")]
    id: String,

    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_by: Option<String>,

    #[serde(default)]
    status: Status,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    topic: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    queue: String,
}

impl Metadata {
    /// Stamp fresh metadata for an entity addressed to `topic` (and `queue`, if any).
    #[must_use]
    pub fn new(topic: impl Into<String>, queue: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            created_at: now,
            created_by: None,
            updated_at: Some(now),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            status: Status::Created,
            topic: topic.into(),
            queue: queue.into(),
        }
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Creating actor.
    #[must_use]
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    /// Last update time.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Last updating actor.
    #[must_use]
    pub fn updated_by(&self) -> Option<&str> {
        self.updated_by.as_deref()
    }

    /// Deletion time.
    #[must_use]
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Deleting actor.
    #[must_use]
    pub fn deleted_by(&self) -> Option<&str> {
        self.deleted_by.as_deref()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Resolved topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Resolved queue; empty for messages.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn set_created_by(&mut self, actor: String) {
        self.created_by = Some(actor);
    }

    pub(crate) fn transition(&mut self, status: Status) {
        self.status = status;
        self.updated_at = Some(Utc::now());
        if status == Status::Unsubscribed {
            self.deleted_at = self.updated_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata() {
        let meta = Metadata::new("v1.orders.process", "");
        assert_eq!(meta.status(), Status::Created);
        assert_eq!(meta.topic(), "v1.orders.process");
        assert!(meta.queue().is_empty());
        assert!(!meta.id().is_empty());
        assert_eq!(meta.updated_at(), Some(meta.created_at()));
    }

    #[test]
    fn test_unique_ids() {
        let a = Metadata::new("v1.a.b", "");
        let b = Metadata::new("v1.a.b", "");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_transition_stamps_update() {
        let mut meta = Metadata::new("v1.a.b", "v1.a.b.queue");
        meta.transition(Status::Subscribed);
        assert_eq!(meta.status(), Status::Subscribed);
        assert!(meta.updated_at() >= Some(meta.created_at()));
        assert!(meta.deleted_at().is_none());

        meta.transition(Status::Unsubscribed);
        assert_eq!(meta.deleted_at(), meta.updated_at());
    }

    #[test]
    fn test_wire_field_names() {
        let mut meta = Metadata::new("v1.a.b", "");
        meta.set_created_by("svc-orders".into());
        let json = serde_json::to_value(&meta).unwrap();

        assert_eq!(json["status"], "created");
        assert_eq!(json["topic"], "v1.a.b");
        assert_eq!(json["createdBy"], "svc-orders");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("queue").is_none());
        assert!(json.get("deletedAt").is_none());
    }

    #[test]
    fn test_missing_id_is_generated() {
        let meta: Metadata = serde_json::from_str(r#"{"topic":"v1.a.b"}"#).unwrap();
        assert!(!meta.id().is_empty());
        assert_eq!(meta.status(), Status::Created);
    }
}
