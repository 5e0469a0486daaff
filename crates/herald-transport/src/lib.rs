// Transport boundary for the herald publisher.
// Defines the channel/connection traits the publisher drives, the
// confirmation event type, and an in-memory broker for tests and embedding.
// Connection recovery, TLS, and wire framing live behind these traits in the
// real transport; herald only reacts to publish results and confirmations.
pub mod channel;
pub mod error;
pub mod memory;
pub mod types;

pub use channel::{Channel, ConfirmListener, Connection};
pub use error::{ChannelError, ChannelResult};
pub use memory::{ConfirmBehavior, EphemeralBroker, PublishedMessage};
pub use types::{
    Confirmation, DeliveryMode, ExchangeKind, MessageProperties, QueueOptions, SequenceNumber,
};
