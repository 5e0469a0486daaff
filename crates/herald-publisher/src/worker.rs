// Per-message publish worker: one task, one dedicated channel, one
// terminal outcome.
//
// The worker is the only component that ever touches its channel, which is
// what makes the confirmation match rule sound: with a single pending
// publish per channel, a cumulative ack on that channel necessarily covers
// it. Confirmations arrive on whatever context the transport uses for
// callbacks; the listener only redispatches them into a bounded queue owned
// by this task, so state is mutated on exactly one execution context and
// the publish-call return path cannot race the callback path.
use bytes::Bytes;
use herald_transport::{Channel, Confirmation, SequenceNumber};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;

use crate::message::{build_properties, PublishRequest};
use crate::outcome::Outcome;
use crate::target::PublisherTarget;

/// Confirmations queued between the transport callback and the worker. One
/// pending publish means one relevant event; the headroom absorbs stray
/// duplicates without blocking the transport.
const CONFIRM_QUEUE_DEPTH: usize = 16;

/// Drive one publish to its terminal outcome, then release the channel and
/// resolve the caller's handle. The channel is closed before the outcome is
/// sent so that an observed outcome implies the channel is already gone.
pub(crate) async fn run_publish_worker(
    channel: Box<dyn Channel>,
    target: PublisherTarget,
    request: PublishRequest,
    message_timeout: Duration,
    outcome_tx: oneshot::Sender<Outcome>,
) {
    let outcome = publish_and_confirm(channel.as_ref(), &target, &request, message_timeout).await;
    if let Err(err) = channel.close().await {
        tracing::debug!(error = %err, "dedicated channel close failed");
    }
    // The receiver may have been dropped by an uninterested caller; that is
    // their call, not an error.
    let _ = outcome_tx.send(outcome);
}

async fn publish_and_confirm(
    channel: &dyn Channel,
    target: &PublisherTarget,
    request: &PublishRequest,
    message_timeout: Duration,
) -> Outcome {
    if let Err(err) = channel.enable_confirms().await {
        return Outcome::PublishFailed(format!("enable confirms: {err}"));
    }

    // Register the listener before publishing: the transport may confirm
    // from its own context before the publish call returns, and the queue
    // holds such early events until the worker starts waiting.
    let (confirm_tx, confirm_rx) = mpsc::channel(CONFIRM_QUEUE_DEPTH);
    channel.on_confirm(Box::new(move |confirmation| {
        // try_send: never block the transport's callback context. A full
        // queue can only mean a confirm storm for a channel with one
        // pending publish; dropping the excess is safe.
        let _ = confirm_tx.try_send(confirmation);
    }));

    // The timeout window opens when the publish attempt begins, not when it
    // returns: a publish blocked on broker flow control or a reconnecting
    // transport must still resolve to TimedOut.
    let deadline = tokio::time::sleep(message_timeout);
    tokio::pin!(deadline);

    let properties = build_properties(request, target);
    let publish = channel.publish(
        target.exchange_name(),
        target.routing_key(),
        properties,
        Bytes::clone(&request.body),
    );
    tokio::pin!(publish);
    let seq_no = tokio::select! {
        result = &mut publish => match result {
            Ok(seq_no) => seq_no,
            Err(err) => return Outcome::PublishFailed(err.to_string()),
        },
        _ = &mut deadline => {
            return Outcome::TimedOut(format!("timed out after {message_timeout:?}"));
        }
    };
    tracing::debug!(seq_no, exchange = target.exchange_name(), "publish pending");

    await_confirmation(confirm_rx, seq_no, deadline, message_timeout).await
}

/// Wait for exactly one of: a covering confirmation, or expiry of the
/// deadline armed before the publish attempt. Returning drops the timer,
/// which is its cancellation.
async fn await_confirmation(
    mut confirm_rx: mpsc::Receiver<Confirmation>,
    pending: SequenceNumber,
    mut deadline: Pin<&mut Sleep>,
    message_timeout: Duration,
) -> Outcome {
    let mut confirms_open = true;
    loop {
        tokio::select! {
            confirmation = confirm_rx.recv(), if confirms_open => {
                match confirmation {
                    Some(confirmation) if covers(&confirmation, pending) => {
                        return match confirmation {
                            Confirmation::Ack { .. } => Outcome::Accepted,
                            Confirmation::Nack { .. } => {
                                Outcome::Rejected("message not successfully received".to_string())
                            }
                        };
                    }
                    Some(confirmation) => {
                        // A confirmation for a sequence number this channel
                        // never published; log and keep waiting.
                        tracing::warn!(
                            ?confirmation,
                            pending,
                            "ignoring confirmation that does not cover the pending publish"
                        );
                    }
                    None => {
                        tracing::warn!(pending, "confirmation stream dropped before resolution");
                        confirms_open = false;
                    }
                }
            }
            _ = &mut deadline => {
                return Outcome::TimedOut(format!("timed out after {message_timeout:?}"));
            }
        }
    }
}

/// Match rule: a non-cumulative event covers the pending publish iff the
/// sequence numbers are equal; a cumulative event covers it iff its sequence
/// number is at least the pending one.
fn covers(confirmation: &Confirmation, pending: SequenceNumber) -> bool {
    if confirmation.is_multiple() {
        confirmation.seq_no() >= pending
    } else {
        confirmation.seq_no() == pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use herald_transport::{
        ChannelError, ChannelResult, ConfirmListener, ExchangeKind, MessageProperties,
        QueueOptions,
    };
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn covers_single_requires_equality() {
        let ack = Confirmation::Ack {
            seq_no: 3,
            multiple: false,
        };
        assert!(covers(&ack, 3));
        assert!(!covers(&ack, 2));
        assert!(!covers(&ack, 4));
    }

    #[test]
    fn covers_cumulative_requires_at_least() {
        let nack = Confirmation::Nack {
            seq_no: 5,
            multiple: true,
        };
        assert!(covers(&nack, 5));
        assert!(covers(&nack, 1));
        assert!(!covers(&nack, 6));
    }

    /// Channel scripted by the test: publish returns a fixed sequence number
    /// (or a fault), and the test holds the listener to inject
    /// confirmations at will, including after the worker has terminated.
    struct ScriptedChannel {
        seq_no: SequenceNumber,
        fail_publish: bool,
        hang_publish: bool,
        listener: Arc<Mutex<Option<ConfirmListener>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedChannel {
        fn new(seq_no: SequenceNumber) -> (Self, Arc<Mutex<Option<ConfirmListener>>>, Arc<AtomicBool>) {
            let listener = Arc::new(Mutex::new(None));
            let closed = Arc::new(AtomicBool::new(false));
            (
                Self {
                    seq_no,
                    fail_publish: false,
                    hang_publish: false,
                    listener: Arc::clone(&listener),
                    closed: Arc::clone(&closed),
                },
                listener,
                closed,
            )
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn enable_confirms(&self) -> ChannelResult<()> {
            Ok(())
        }

        fn on_confirm(&self, listener: ConfirmListener) {
            *self.listener.lock() = Some(listener);
        }

        async fn publish(
            &self,
            _exchange: &str,
            _routing_key: &str,
            _properties: MessageProperties,
            _body: Bytes,
        ) -> ChannelResult<SequenceNumber> {
            if self.fail_publish {
                return Err(ChannelError::Publish("scripted fault".to_string()));
            }
            if self.hang_publish {
                // A publish stuck on broker flow control never returns.
                std::future::pending::<()>().await;
            }
            Ok(self.seq_no)
        }

        async fn declare_exchange(
            &self,
            _name: &str,
            _kind: ExchangeKind,
            _durable: bool,
        ) -> ChannelResult<()> {
            Ok(())
        }

        async fn declare_queue(&self, _name: &str, _options: QueueOptions) -> ChannelResult<()> {
            Ok(())
        }

        async fn close(&self) -> ChannelResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fire(listener: &Arc<Mutex<Option<ConfirmListener>>>, confirmation: Confirmation) {
        let guard = listener.lock();
        let listener = guard.as_ref().expect("listener registered");
        listener(confirmation);
    }

    /// Yield until the worker has registered its listener. Keeping the test
    /// task ready also prevents the paused clock from auto-advancing into
    /// the timeout while we wait.
    async fn wait_for_listener(listener: &Arc<Mutex<Option<ConfirmListener>>>) {
        loop {
            {
                if listener.lock().is_some() {
                    break;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn request() -> PublishRequest {
        PublishRequest::new("msg-1", "svc", "text/plain", Bytes::from_static(b"hi"))
    }

    fn target() -> PublisherTarget {
        let config = crate::config::PublisherConfig {
            exchange: Some("orders.exchange".to_string()),
            routing_key: Some("order.created".to_string()),
            ..Default::default()
        };
        PublisherTarget::from_config(&config).expect("target")
    }

    async fn run(
        channel: ScriptedChannel,
        timeout: Duration,
    ) -> (tokio::task::JoinHandle<()>, oneshot::Receiver<Outcome>) {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let handle = tokio::spawn(run_publish_worker(
            Box::new(channel),
            target(),
            request(),
            timeout,
            outcome_tx,
        ));
        (handle, outcome_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn cumulative_ack_above_pending_resolves_accepted() {
        let (channel, listener, closed) = ScriptedChannel::new(4);
        let (handle, outcome_rx) = run(channel, Duration::from_secs(5)).await;
        wait_for_listener(&listener).await;
        fire(
            &listener,
            Confirmation::Ack {
                seq_no: 9,
                multiple: true,
            },
        );
        assert_eq!(outcome_rx.await.expect("outcome"), Outcome::Accepted);
        handle.await.expect("worker join");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cumulative_ack_below_pending_is_ignored() {
        let (channel, listener, _closed) = ScriptedChannel::new(4);
        let (handle, outcome_rx) = run(channel, Duration::from_millis(100)).await;
        wait_for_listener(&listener).await;
        fire(
            &listener,
            Confirmation::Ack {
                seq_no: 3,
                multiple: true,
            },
        );
        // Does not cover seq 4; the worker keeps waiting until the timeout.
        let outcome = outcome_rx.await.expect("outcome");
        assert!(matches!(outcome, Outcome::TimedOut(_)));
        handle.await.expect("worker join");
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_single_ack_then_matching_nack() {
        let (channel, listener, _closed) = ScriptedChannel::new(2);
        let (handle, outcome_rx) = run(channel, Duration::from_secs(5)).await;
        wait_for_listener(&listener).await;
        fire(
            &listener,
            Confirmation::Ack {
                seq_no: 7,
                multiple: false,
            },
        );
        fire(
            &listener,
            Confirmation::Nack {
                seq_no: 2,
                multiple: false,
            },
        );
        assert_eq!(
            outcome_rx.await.expect("outcome"),
            Outcome::Rejected("message not successfully received".to_string())
        );
        handle.await.expect("worker join");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_confirmation_then_late_ack_is_inert() {
        let (channel, listener, closed) = ScriptedChannel::new(0);
        let (handle, outcome_rx) = run(channel, Duration::from_millis(100)).await;
        let outcome = outcome_rx.await.expect("outcome");
        assert_eq!(
            outcome,
            Outcome::TimedOut(format!("timed out after {:?}", Duration::from_millis(100)))
        );
        handle.await.expect("worker join");
        assert!(closed.load(Ordering::SeqCst));
        // A late ack for the already-resolved sequence number goes nowhere:
        // the worker is gone and its queue receiver dropped.
        fire(
            &listener,
            Confirmation::Ack {
                seq_no: 0,
                multiple: false,
            },
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_publish_resolves_timed_out_and_closes_channel() {
        let (mut channel, _listener, closed) = ScriptedChannel::new(0);
        channel.hang_publish = true;
        let (handle, outcome_rx) = run(channel, Duration::from_millis(100)).await;
        let outcome = outcome_rx.await.expect("outcome");
        assert_eq!(
            outcome,
            Outcome::TimedOut(format!("timed out after {:?}", Duration::from_millis(100)))
        );
        handle.await.expect("worker join");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_fault_resolves_publish_failed_and_closes_channel() {
        let (mut channel, _listener, closed) = ScriptedChannel::new(0);
        channel.fail_publish = true;
        let (handle, outcome_rx) = run(channel, Duration::from_secs(5)).await;
        let outcome = outcome_rx.await.expect("outcome");
        assert_eq!(
            outcome,
            Outcome::PublishFailed("publish failed: scripted fault".to_string())
        );
        handle.await.expect("worker join");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_before_worker_waits_is_not_lost() {
        // The scripted channel lets the test fire the confirmation from the
        // publish call itself by invoking the listener first.
        let (channel, listener, _closed) = ScriptedChannel::new(0);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let listener_for_publish = Arc::clone(&listener);
        let handle = tokio::spawn(async move {
            run_publish_worker(
                Box::new(channel),
                target(),
                request(),
                Duration::from_secs(5),
                outcome_tx,
            )
            .await;
        });
        // Confirm as soon as the listener exists, simulating a transport
        // that acks before publish returns.
        wait_for_listener(&listener_for_publish).await;
        fire(
            &listener_for_publish,
            Confirmation::Ack {
                seq_no: 0,
                multiple: false,
            },
        );
        assert_eq!(outcome_rx.await.expect("outcome"), Outcome::Accepted);
        handle.await.expect("worker join");
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_listener_still_times_out() {
        let (channel, listener, _closed) = ScriptedChannel::new(0);
        let (handle, outcome_rx) = run(channel, Duration::from_millis(100)).await;
        wait_for_listener(&listener).await;
        // Transport forgets the listener; the confirm queue sender drops.
        *listener.lock() = None;
        let outcome = outcome_rx.await.expect("outcome");
        assert!(matches!(outcome, Outcome::TimedOut(_)));
        handle.await.expect("worker join");
    }
}
