// Confirmed-publish delivery tracker.
//
// Publishes a message to a broker and reliably tells the original caller
// whether that specific message was durably accepted, rejected, or timed
// out, reconciling three racing event sources (the publish call itself, an
// async ack/nack, and a timeout) into exactly one terminal outcome.
//
// DESIGN INTENT
// -------------
// Broker confirmations are channel-scoped and keyed by a per-channel
// sequence number. When several callers publish concurrently on a shared
// channel, a cumulative ack ("everything up to N") is ambiguous without
// extra bookkeeping and locking. Herald sidesteps that entirely: every
// in-flight message gets its own dedicated channel, owned by one spawned
// worker task for its whole lifetime. With exactly one pending publish per
// channel, any confirmation on that channel can only refer to that publish,
// so cumulative acks degenerate to a single-message match. The dedicated
// channel is the correctness mechanism, not an optimization.
//
// Scaling comes from running many workers in parallel, never from sharing a
// channel. The only object workers share is the connection used to mint new
// channels, which the transport must keep safe for concurrent channel
// creation.
pub mod config;
pub mod message;
pub mod outcome;
pub mod publisher;
pub mod target;
pub mod topology;
mod worker;

pub use config::PublisherConfig;
pub use message::PublishRequest;
pub use outcome::{ConfirmationHandle, Outcome};
pub use publisher::ConfirmedPublisher;
pub use target::{ConfigError, PublisherTarget, Routing};
pub use topology::PublisherError;
