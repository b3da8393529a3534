//! # herald-transport
//!
//! Transport abstraction layer for Herald.
//!
//! A transport is the broker connection a Herald backend delegates delivery to.
//! The core only ever talks to the [`Transport`] trait:
//!
//! - **publish** - send an encoded envelope to a topic
//! - **queue_subscribe** - join a competing-consumers group on a topic
//! - **flush** - lightweight connectivity probe used by health checks
//! - **close** - tear the connection down
//!
//! ## Transports
//!
//! - **memory** - an in-process broker, useful for tests and local fan-out
//!
//! ```rust,ignore
//! use herald_transport::{Connector, MemoryBroker};
//!
//! let broker = MemoryBroker::new();
//! let transport = broker.connect("memory://primary").await?;
//! transport.publish("v1.orders.created", payload).await?;
//! ```

pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

pub use traits::{
    callback, Connector, MessageCallback, SubscriptionHandle, Transport, TransportError,
};

#[cfg(feature = "memory")]
pub use memory::{BrokerStats, MemoryBroker, MemoryTransport};
