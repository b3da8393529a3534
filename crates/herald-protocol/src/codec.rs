//! Envelope codec for Herald.
//!
//! Envelopes are encoded with a self-describing, field-named format so that
//! publishers and subscribers on different versions can still read each other.
//! JSON is the default; named MessagePack is available for denser payloads.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum encoded payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds maximum size.
    #[error("Payload size {0} exceeds maximum {MAX_PAYLOAD_SIZE}")]
    PayloadTooLarge(usize),

    /// JSON encoding error.
    #[error("JSON encoding error: {0}")]
    JsonEncode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("JSON decoding error: {0}")]
    JsonDecode(#[source] serde_json::Error),

    /// MessagePack encoding error.
    #[error("MessagePack encoding error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("MessagePack decoding error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    /// Unknown wire format name.
    #[error("Unknown wire format: {0}")]
    UnknownFormat(String),
}

impl ProtocolError {
    /// Whether the failure happened while encoding.
    #[must_use]
    pub fn is_encode(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge(_) | Self::JsonEncode(_) | Self::MsgpackEncode(_)
        )
    }
}

/// Encoding used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// UTF-8 JSON.
    #[default]
    Json,
    /// MessagePack with field names (maps, not arrays).
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl WireFormat {
    /// Format name as used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::MessagePack),
            other => Err(ProtocolError::UnknownFormat(other.to_string())),
        }
    }
}

/// Encode a value to bytes.
///
/// # Errors
///
/// Returns an error if serialization fails or the result is too large.
pub fn encode<T: Serialize + ?Sized>(value: &T, format: WireFormat) -> Result<Bytes, ProtocolError> {
    let payload = match format {
        WireFormat::Json => serde_json::to_vec(value).map_err(ProtocolError::JsonEncode)?,
        WireFormat::MessagePack => rmp_serde::to_vec_named(value)?,
    };

    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a value from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or malformed.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: WireFormat) -> Result<T, ProtocolError> {
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }

    match format {
        WireFormat::Json => serde_json::from_slice(data).map_err(ProtocolError::JsonDecode),
        WireFormat::MessagePack => Ok(rmp_serde::from_slice(data)?),
    }
}

/// Re-encode `value` and decode it as `U`.
///
/// Used to recover a typed payload from a loosely-typed one, e.g. a
/// `serde_json::Value` received over the wire.
///
/// # Errors
///
/// Returns an encode error if `value` cannot be serialized, or a decode error
/// if the encoded form does not fit `U`.
pub fn transcode<T, U>(value: &T) -> Result<U, ProtocolError>
where
    T: Serialize + ?Sized,
    U: DeserializeOwned,
{
    let bytes = encode(value, WireFormat::Json)?;
    decode(&bytes, WireFormat::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        sku: String,
    }

    #[test]
    fn test_json_is_field_named() {
        let order = Order {
            id: 7,
            sku: "abc".into(),
        };
        let encoded = encode(&order, WireFormat::Json).unwrap();
        assert_eq!(&encoded[..], br#"{"id":7,"sku":"abc"}"#);
    }

    #[test]
    fn test_msgpack_keeps_field_names() {
        let order = Order {
            id: 7,
            sku: "abc".into(),
        };
        let encoded = encode(&order, WireFormat::MessagePack).unwrap();

        // Decodes into a map keyed by field name, not a positional array.
        let as_value: serde_json::Value = decode(&encoded, WireFormat::MessagePack).unwrap();
        assert_eq!(as_value["sku"], "abc");

        let decoded: Order = decode(&encoded, WireFormat::MessagePack).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode::<Order>(b"{not json", WireFormat::Json).unwrap_err();
        assert!(matches!(err, ProtocolError::JsonDecode(_)));
        assert!(!err.is_encode());
    }

    #[test]
    fn test_payload_too_large() {
        let big = "x".repeat(MAX_PAYLOAD_SIZE + 1);
        match encode(&big, WireFormat::Json) {
            Err(ProtocolError::PayloadTooLarge(_)) => {}
            other => panic!("Expected PayloadTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_transcode_into_typed() {
        let value = serde_json::json!({"id": 1, "sku": "z"});
        let order: Order = transcode(&value).unwrap();
        assert_eq!(order.id, 1);

        let err = transcode::<_, Order>(&serde_json::json!({"id": "nope"})).unwrap_err();
        assert!(matches!(err, ProtocolError::JsonDecode(_)));
    }

    #[test]
    fn test_wire_format_parse() {
        assert_eq!("json".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!(
            "msgpack".parse::<WireFormat>().unwrap(),
            WireFormat::MessagePack
        );
        assert!("xml".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::default(), WireFormat::Json);
    }
}
