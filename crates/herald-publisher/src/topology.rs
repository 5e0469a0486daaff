// One-shot topology declaration, run before the front door accepts requests.
use herald_transport::{ChannelError, Connection, QueueOptions};
use thiserror::Error;

use crate::target::{ConfigError, PublisherTarget};

/// Construction-time failures. Configuration problems and broker-refused
/// declarations both prevent the publisher from starting.
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("invalid publisher configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("broker setup failed: {0}")]
    Channel(#[from] ChannelError),
}

/// Declare the publisher's destination on a transient setup channel.
///
/// The named exchange is declared durable with its configured kind; a queue
/// target is declared durable, non-exclusive, non-auto-delete. The setup
/// channel is closed on the failure path too.
pub async fn declare_target(
    connection: &dyn Connection,
    target: &PublisherTarget,
) -> Result<(), PublisherError> {
    let channel = connection.open_channel().await?;
    let declared = match target {
        PublisherTarget::Exchange { name, kind, .. } => {
            channel.declare_exchange(name, *kind, true).await
        }
        PublisherTarget::Queue { name } => {
            channel.declare_queue(name, QueueOptions::default()).await
        }
    };
    let closed = channel.close().await;
    declared?;
    closed?;
    tracing::debug!(
        exchange = target.exchange_name(),
        routing_key = target.routing_key(),
        "publisher target declared"
    );
    Ok(())
}
