//! Topic and queue naming for Herald.
//!
//! Every address in the system follows one grammar:
//!
//! ```text
//! v<digits>.<segment>(.<segment>)+[.queue]
//! ```
//!
//! Segments are alphabetic. A trailing `queue` segment is reserved: it turns a
//! broadcast *topic* into a competing-consumers *queue*. [`Name::to_queue`] and
//! [`Name::to_topic`] convert between the two views without losing anything.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved suffix marking a queue name.
pub const QUEUE_SUFFIX: &str = ".queue";

static NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v\d+\.[a-zA-Z]+(?:\.[a-zA-Z]+)+(?:\.queue)?$").expect("name grammar is valid")
});

/// A raw string failed the naming grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid name {0:?}: expected v<digits>.<segment>(.<segment>)+[.queue]")]
pub struct InvalidName(pub String);

/// Name of a topic or a queue.
///
/// Names built through [`Name::new`] (or parsed with `FromStr`) are always
/// valid. [`Name::raw`] skips validation; the conversions on such a name are
/// no-ops that hand the input back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Create a validated name, e.g. `"v1.meta.created"` or `"v1.meta.created.queue"`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidName`] if `raw` does not match the grammar.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidName> {
        let name = Self(raw.into());
        name.validate()?;
        Ok(name)
    }

    /// Wrap a string without validating it.
    #[must_use]
    pub fn raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Check the name against the grammar.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidName`] carrying the offending string.
    pub fn validate(&self) -> Result<(), InvalidName> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(InvalidName(self.0.clone()))
        }
    }

    /// Whether the name matches the grammar.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        NAME_REGEX.is_match(&self.0)
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a valid name carrying the reserved queue suffix.
    ///
    /// The suffix only counts when what precedes it is itself a valid name, so
    /// `v1.orders.queue` is a topic whose last segment happens to be `queue`.
    #[must_use]
    pub fn is_queue(&self) -> bool {
        self.is_valid() && strip_queue_suffix(&self.0).is_some()
    }

    /// Break the name into its parts.
    ///
    /// The whole name comes first, then the version segment, every regular
    /// segment, and finally `queue` when the suffix is present. An invalid name
    /// yields an empty vector.
    #[must_use]
    pub fn parts(&self) -> Vec<String> {
        if !self.is_valid() {
            return Vec::new();
        }

        let (body, queue) = match strip_queue_suffix(&self.0) {
            Some(body) => (body, true),
            None => (self.0.as_str(), false),
        };

        let mut parts = Vec::with_capacity(body.matches('.').count() + 3);
        parts.push(self.0.clone());
        parts.extend(body.split('.').map(str::to_string));
        if queue {
            parts.push("queue".to_string());
        }
        parts
    }

    /// The numeric version, e.g. `1` for `v1.orders.process`.
    #[must_use]
    pub fn version(&self) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        self.0
            .split('.')
            .next()
            .and_then(|v| v.strip_prefix('v'))
            .and_then(|digits| digits.parse().ok())
    }

    /// Convert to the queue view: the topic form plus exactly one suffix.
    #[must_use]
    pub fn to_queue(&self) -> Queue {
        if self.is_valid() {
            return Queue(Name(format!("{}{QUEUE_SUFFIX}", topic_body(&self.0))));
        }
        Queue(self.clone())
    }

    /// Convert to the topic view, removing every reserved suffix.
    ///
    /// `v1.orders.process.queue.queue` is itself valid, so stripping stops only
    /// once what remains no longer carries a suffix on a valid body.
    #[must_use]
    pub fn to_topic(&self) -> Topic {
        if self.is_valid() {
            return Topic(Name(topic_body(&self.0).to_string()));
        }
        Topic(self.clone())
    }

    /// Consume the name, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Returns the body before a reserved `.queue` suffix, when the body is a valid name.
fn strip_queue_suffix(s: &str) -> Option<&str> {
    s.strip_suffix(QUEUE_SUFFIX)
        .filter(|body| NAME_REGEX.is_match(body))
}

/// Strips reserved suffixes until none is left.
fn topic_body(mut s: &str) -> &str {
    while let Some(body) = strip_queue_suffix(s) {
        s = body;
    }
    s
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Name {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Name {
    type Error = InvalidName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

macro_rules! name_view {
    ($(#[$doc:meta])* $view:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $view(Name);

        impl $view {
            /// Get the view as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Borrow the underlying name.
            #[must_use]
            pub fn as_name(&self) -> &Name {
                &self.0
            }

            /// Consume the view, returning the underlying name.
            #[must_use]
            pub fn into_name(self) -> Name {
                self.0
            }

            /// See [`Name::to_queue`].
            #[must_use]
            pub fn to_queue(&self) -> Queue {
                self.0.to_queue()
            }

            /// See [`Name::to_topic`].
            #[must_use]
            pub fn to_topic(&self) -> Topic {
                self.0.to_topic()
            }
        }

        impl fmt::Display for $view {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl AsRef<str> for $view {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl From<$view> for String {
            fn from(view: $view) -> Self {
                view.0.into_string()
            }
        }
    };
}

name_view!(
    /// A broadcast address, e.g. `"v1.meta.created"`.
    Topic
);

name_view!(
    /// A competing-consumers address, e.g. `"v1.meta.created.queue"`.
    Queue
);

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &[&str] = &[
        "v1.orders.process",
        "v2.users.sync",
        "v1.inventory.restock.queue",
        "v1.orders.process.queue",
        "v2.users.sync.queue",
        "v10.Billing.Invoice.created",
        "v1.orders.process.queue.queue",
    ];

    const INVALID: &[&str] = &[
        "v1.orders.process_queue",
        "orders.process",
        "v1.orders",
        "v1_orders.process",
        "v.orders.process",
        "v1.orders.pro1cess",
        "v1.orders..process",
        "",
    ];

    #[test]
    fn test_valid_names_round_trip() {
        for raw in VALID {
            let name = Name::new(*raw).unwrap();
            assert_eq!(name.to_string(), *raw);
            assert_eq!(name.as_str(), *raw);
        }
    }

    #[test]
    fn test_invalid_names_rejected() {
        for raw in INVALID {
            match Name::new(*raw) {
                Err(InvalidName(s)) => assert_eq!(s, *raw),
                Ok(n) => panic!("expected {raw:?} to be rejected, got {n}"),
            }
        }
    }

    #[test]
    fn test_parts() {
        let name = Name::new("v1.orders.process.queue").unwrap();
        assert_eq!(
            name.parts(),
            vec!["v1.orders.process.queue", "v1", "orders", "process", "queue"]
        );

        let topic = Name::new("v2.users.sync").unwrap();
        assert_eq!(topic.parts(), vec!["v2.users.sync", "v2", "users", "sync"]);

        assert!(Name::raw("orders.process").parts().is_empty());
    }

    #[test]
    fn test_version() {
        assert_eq!(Name::new("v12.a.b").unwrap().version(), Some(12));
        assert_eq!(Name::raw("x.a.b").version(), None);
    }

    #[test]
    fn test_to_queue() {
        let name = Name::new("v1.orders.process").unwrap();
        assert_eq!(name.to_queue().as_str(), "v1.orders.process.queue");
        assert_eq!(name.to_queue().to_queue(), name.to_queue());

        let queue = Name::new("v1.orders.process.queue").unwrap();
        assert_eq!(queue.to_queue().as_str(), "v1.orders.process.queue");
    }

    #[test]
    fn test_to_topic() {
        let queue = Name::new("v1.orders.process.queue").unwrap();
        assert_eq!(queue.to_topic().as_str(), "v1.orders.process");
        assert_eq!(queue.to_topic().to_topic(), queue.to_topic());

        let topic = Name::new("v1.orders.process").unwrap();
        assert_eq!(topic.to_topic().as_str(), "v1.orders.process");
    }

    #[test]
    fn test_conversions_are_lossless() {
        for raw in VALID {
            let name = Name::new(*raw).unwrap();
            assert_eq!(name.to_queue().to_topic(), name.to_topic());
            assert_eq!(name.to_topic().to_queue(), name.to_queue());
            assert_eq!(name.to_topic().to_topic(), name.to_topic());
            assert_eq!(name.to_queue().to_queue(), name.to_queue());
            assert!(name.to_queue().as_name().is_valid());
            assert!(name.to_topic().as_name().is_valid());
            if !name.is_queue() {
                assert_eq!(name.to_queue().to_topic().into_name(), name);
            }
        }
    }

    #[test]
    fn test_reserved_suffix_needs_a_full_body() {
        // `v1.orders` alone is not a name, so `queue` is a regular segment here.
        let name = Name::new("v1.orders.queue").unwrap();
        assert!(!name.is_queue());
        assert_eq!(name.to_topic().as_str(), "v1.orders.queue");
        assert_eq!(name.to_queue().as_str(), "v1.orders.queue.queue");
        assert_eq!(name.to_queue().to_topic(), name.to_topic());
    }

    #[test]
    fn test_repeated_suffix_collapses() {
        let name = Name::new("v1.orders.process.queue.queue").unwrap();
        assert!(name.is_queue());
        assert_eq!(name.to_topic().as_str(), "v1.orders.process");
        assert_eq!(name.to_queue().as_str(), "v1.orders.process.queue");
    }

    #[test]
    fn test_conversions_on_invalid_name_are_noops() {
        let name = Name::raw("orders.process");
        assert_eq!(name.to_queue().as_str(), "orders.process");
        assert_eq!(name.to_topic().as_str(), "orders.process");
    }

    #[test]
    fn test_serde_validates() {
        let name: Name = serde_json::from_str("\"v1.orders.process\"").unwrap();
        assert_eq!(name.as_str(), "v1.orders.process");
        assert!(serde_json::from_str::<Name>("\"orders\"").is_err());
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"v1.orders.process\"");
    }
}
