//! Publish/subscribe transport for the simplebot stack.
//!
//! Neither the agent nor the client ever talks to a broker library directly;
//! both hold an `Arc<dyn MessageBus>` and speak named topics.  [`MemoryBus`]
//! is the in-process implementation used by tests and the simulated stack; a
//! real MQTT transport plugs in behind the same trait.

pub mod bus;
pub mod url;

pub use bus::{BusMessage, BusSubscription, MemoryBus, MessageBus};
pub use url::BrokerUrl;
