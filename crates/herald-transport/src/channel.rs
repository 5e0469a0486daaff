// Traits the publisher drives. The real transport (and its reconnection
// policy) lives behind these; herald only ever sees publish results and
// confirmation callbacks.
use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ChannelResult;
use crate::types::{Confirmation, ExchangeKind, MessageProperties, QueueOptions, SequenceNumber};

/// Callback translating broker acknowledgements into `Confirmation` values.
///
/// The transport may invoke the listener on its own context, including
/// before the corresponding `publish` call has returned. Listeners must not
/// block; hand the event off to your own execution context instead.
pub type ConfirmListener = Box<dyn Fn(Confirmation) + Send + Sync>;

/// A logical broker channel. Each channel is exclusively owned by exactly
/// one component for its entire lifetime and always closed by that owner.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Switch the channel into acknowledgement mode. Must be called before
    /// `publish` when confirmations are expected.
    async fn enable_confirms(&self) -> ChannelResult<()>;

    /// Register the confirmation listener. At most one listener per channel;
    /// registering again replaces the previous one.
    fn on_confirm(&self, listener: ConfirmListener);

    /// Publish a message and return the sequence number the channel assigned
    /// to it. An empty `exchange` addresses the default exchange, in which
    /// case `routing_key` names the destination queue.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: MessageProperties,
        body: Bytes,
    ) -> ChannelResult<SequenceNumber>;

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> ChannelResult<()>;

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> ChannelResult<()>;

    /// Close the channel. Idempotent; late confirmations for a closed
    /// channel are dropped by the transport.
    async fn close(&self) -> ChannelResult<()>;
}

/// Shared handle used to mint dedicated channels. Must be safe for
/// concurrent `open_channel` calls; this is the only object herald shares
/// across publish workers.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn open_channel(&self) -> ChannelResult<Box<dyn Channel>>;
}
