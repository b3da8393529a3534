//! Messages published through Herald.

use bytes::Bytes;
use herald_protocol::{codec, Name, WireFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{HeraldError, Result};
use crate::metadata::{Metadata, Status};

/// Bound for message payloads.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A message addressed to a topic.
///
/// On the wire the metadata fields sit next to `data` in a single object:
///
/// ```json
/// {"id":"...","createdAt":"...","status":"created","topic":"v1.orders.process","data":{...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T = serde_json::Value> {
    #[serde(flatten)]
    meta: Metadata,
    data: T,
}

impl<T: Payload> Message<T> {
    /// Create a message for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::InvalidName`] if `topic` is not a valid name.
    pub fn new(topic: impl Into<String>, data: T) -> Result<Self> {
        let topic = Name::new(topic)?;
        Ok(Self {
            meta: Metadata::new(topic.into_string(), String::new()),
            data,
        })
    }

    /// Replace the generated identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.meta.set_id(id.into());
        self
    }

    /// Record the creating actor.
    #[must_use]
    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.meta.set_created_by(actor.into());
        self
    }

    /// Check the message is publishable.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or the topic is not a valid name.
    pub fn validate(&self) -> Result<()> {
        if self.meta.id().is_empty() {
            return Err(HeraldError::validation("message id is empty"));
        }
        Name::raw(self.meta.topic()).validate()?;
        Ok(())
    }

    /// Convert a loosely-typed value into `U` by re-encoding it.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::Encode`] if `raw` cannot be serialized and
    /// [`HeraldError::Decode`] if the result does not fit `U`.
    pub fn process<R, U>(&self, raw: &R) -> Result<U>
    where
        R: Serialize + ?Sized,
        U: DeserializeOwned,
    {
        Ok(codec::transcode(raw)?)
    }

    /// Read the payload as `U`.
    ///
    /// # Errors
    ///
    /// See [`Message::process`].
    pub fn data_as<U: DeserializeOwned>(&self) -> Result<U> {
        self.process(&self.data)
    }

    /// Encode the message envelope.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::Encode`] on serialization failure.
    pub fn encode(&self, format: WireFormat) -> Result<Bytes> {
        Ok(codec::encode(self, format)?)
    }

    /// Decode a message envelope.
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::Decode`] if `data` is not a valid envelope.
    pub fn decode(data: &[u8], format: WireFormat) -> Result<Self> {
        Ok(codec::decode(data, format)?)
    }
}

impl<T> Message<T> {
    /// Message identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.meta.id()
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.meta.topic()
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

    /// Payload.
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consume the message, returning the payload.
    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.meta.transition(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        sku: String,
    }

    #[test]
    fn test_new_message() {
        let msg = Message::new("v1.orders.process", json!({"id": 1})).unwrap();
        assert_eq!(msg.topic(), "v1.orders.process");
        assert_eq!(msg.status(), Status::Created);
        assert!(!msg.id().is_empty());
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_invalid_topic_rejected() {
        let err = Message::new("orders", json!(null)).unwrap_err();
        assert!(matches!(err, HeraldError::InvalidName(_)));
    }

    #[test]
    fn test_builders() {
        let msg = Message::new("v1.orders.process", json!(1))
            .unwrap()
            .with_id("order-1")
            .created_by("checkout");
        assert_eq!(msg.id(), "order-1");
        assert_eq!(msg.metadata().created_by(), Some("checkout"));

        let msg = msg.with_id("");
        assert!(matches!(msg.validate(), Err(HeraldError::Validation(_))));
    }

    #[test]
    fn test_process_typed_payload() {
        let msg = Message::new("v1.orders.process", json!({"id": 3, "sku": "x"})).unwrap();
        let order: Order = msg.data_as().unwrap();
        assert_eq!(order.sku, "x");

        let bad = msg.process::<_, Order>(&json!({"id": "three"})).unwrap_err();
        assert!(matches!(bad, HeraldError::Decode(_)));
    }

    #[test]
    fn test_envelope_is_flat() {
        let msg = Message::new(
            "v1.orders.process",
            Order {
                id: 9,
                sku: "abc".into(),
            },
        )
        .unwrap();
        let bytes = msg.encode(WireFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["topic"], "v1.orders.process");
        assert_eq!(value["status"], "created");
        assert_eq!(value["data"]["sku"], "abc");
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn test_decode_envelope() {
        let msg = Message::new("v1.orders.process", json!({"k": "v"})).unwrap();
        let bytes = msg.encode(WireFormat::Json).unwrap();
        let decoded = Message::<serde_json::Value>::decode(&bytes, WireFormat::Json).unwrap();
        assert_eq!(decoded, msg);

        assert!(matches!(
            Message::<Order>::decode(b"[]", WireFormat::Json),
            Err(HeraldError::Decode(_))
        ));
    }

    #[test]
    fn test_set_status() {
        let mut msg = Message::new("v1.a.b", json!(null)).unwrap();
        msg.set_status(Status::Published);
        assert_eq!(msg.status(), Status::Published);
    }
}
