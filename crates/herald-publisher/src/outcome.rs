// Terminal outcomes and the caller's handle to one.
use tokio::sync::oneshot;

/// The single, final result delivered for one published message.
/// Exactly one of these per publish, delivered at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Broker durably accepted the message.
    Accepted,
    /// Broker explicitly declined the message. Not retried here; retrying a
    /// rejected message is usually pointless without changing it.
    Rejected(String),
    /// No confirmation within the configured window. Callers may reasonably
    /// retry this one, which is why it is distinct from `Rejected`.
    TimedOut(String),
    /// The publish call itself failed (channel or connection fault).
    PublishFailed(String),
}

/// Caller-side handle resolved by the publish worker. The front door returns
/// it immediately; the caller awaits it whenever convenient.
pub struct ConfirmationHandle {
    pub(crate) rx: oneshot::Receiver<Outcome>,
}

impl ConfirmationHandle {
    /// Wait for the terminal outcome. A worker that disappears without
    /// resolving (process teardown mid-flight) surfaces as `PublishFailed`
    /// rather than a hang or a silent drop.
    pub async fn outcome(self) -> Outcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::PublishFailed("publish worker dropped".to_string()),
        }
    }
}
