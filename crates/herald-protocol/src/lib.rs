//! # herald-protocol
//!
//! Addressing and wire definitions shared by every Herald backend.
//!
//! - **Name** - the `v<digits>.<segment>(.<segment>)+[.queue]` grammar and its
//!   `Topic` / `Queue` views
//! - **Codec** - self-describing envelope encoding (JSON or named MessagePack)
//!
//! ## Example
//!
//! ```rust
//! use herald_protocol::Name;
//!
//! let name = Name::new("v1.orders.process").unwrap();
//! assert_eq!(name.to_queue().as_str(), "v1.orders.process.queue");
//! assert_eq!(name.to_queue().to_topic().as_str(), "v1.orders.process");
//! ```

pub mod codec;
pub mod name;

pub use codec::{decode, encode, ProtocolError, WireFormat, MAX_PAYLOAD_SIZE};
pub use name::{InvalidName, Name, Queue, Topic, QUEUE_SUFFIX};
