// Publisher front door: validates the target once, then spawns one worker
// (and one dedicated channel) per publish request.
use herald_transport::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::PublisherConfig;
use crate::message::PublishRequest;
use crate::outcome::{ConfirmationHandle, Outcome};
use crate::target::PublisherTarget;
use crate::topology::{self, PublisherError};
use crate::worker;

/// Entry point for confirmed publishing. Owns the validated target for its
/// lifetime; shares nothing with the workers except the connection used to
/// mint their channels.
pub struct ConfirmedPublisher {
    connection: Arc<dyn Connection>,
    target: PublisherTarget,
    message_timeout: Duration,
}

impl ConfirmedPublisher {
    /// Validate configuration and declare the destination before accepting
    /// any request. Fails fast: an invalid target or a broker-refused
    /// declaration means no publisher.
    pub async fn start(
        connection: Arc<dyn Connection>,
        config: PublisherConfig,
    ) -> Result<Self, PublisherError> {
        let target = PublisherTarget::from_config(&config)?;
        topology::declare_target(connection.as_ref(), &target).await?;
        Ok(Self {
            connection,
            target,
            message_timeout: config.message_timeout,
        })
    }

    /// Publish one message. Returns immediately; the handle resolves with
    /// the message's single terminal outcome. Requests are independent:
    /// concurrency comes from parallel workers on their own channels, never
    /// from sharing one.
    pub fn publish(&self, request: PublishRequest) -> ConfirmationHandle {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let connection = Arc::clone(&self.connection);
        let target = self.target.clone();
        let message_timeout = self.message_timeout;
        tokio::spawn(async move {
            let channel = match connection.open_channel().await {
                Ok(channel) => channel,
                Err(err) => {
                    // Channel creation failure is a per-request outcome, not
                    // a crash of the front door.
                    tracing::warn!(error = %err, "dedicated channel open failed");
                    let _ = outcome_tx.send(Outcome::PublishFailed(format!(
                        "channel open failed: {err}"
                    )));
                    return;
                }
            };
            worker::run_publish_worker(channel, target, request, message_timeout, outcome_tx).await;
        });
        ConfirmationHandle { rx: outcome_rx }
    }

    pub fn target(&self) -> &PublisherTarget {
        &self.target
    }
}
