// In-memory broker implementing the transport traits.
// Used by the test suite and for embedding herald into a single process.
// Confirmation behavior is scriptable so failure paths can be exercised
// without a real broker.
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::channel::{Channel, ConfirmListener, Connection};
use crate::error::{ChannelError, ChannelResult};
use crate::types::{Confirmation, ExchangeKind, MessageProperties, QueueOptions, SequenceNumber};

/// How the broker confirms each publish on a confirm-mode channel.
///
/// The listener is invoked synchronously from inside `publish`, before the
/// call returns. That is deliberately the nastiest legal ordering: it forces
/// callers to hand confirmations off to their own context instead of
/// assuming the publish return path runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmBehavior {
    /// Ack every message individually (`multiple = false`).
    AckEach,
    /// Ack every message with the cumulative flag set.
    AckCumulative,
    /// Nack every message individually.
    NackEach,
    /// Accept publishes but never confirm them.
    Silent,
    /// Fail the publish call itself, as a channel fault would.
    FailPublish,
}

/// A message the broker accepted, with the channel and sequence number that
/// carried it.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub channel_id: u64,
    pub seq_no: SequenceNumber,
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub body: Bytes,
}

/// In-memory broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EphemeralBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    behavior: Mutex<ConfirmBehavior>,
    refuse_declares: AtomicBool,
    refuse_channels: AtomicBool,
    exchanges: Mutex<BTreeMap<String, ExchangeKind>>,
    queues: Mutex<BTreeSet<String>>,
    published: Mutex<Vec<PublishedMessage>>,
    open_channels: AtomicUsize,
    next_channel_id: AtomicU64,
}

impl EphemeralBroker {
    pub fn new() -> Self {
        Self::with_behavior(ConfirmBehavior::AckEach)
    }

    pub fn with_behavior(behavior: ConfirmBehavior) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                behavior: Mutex::new(behavior),
                refuse_declares: AtomicBool::new(false),
                refuse_channels: AtomicBool::new(false),
                exchanges: Mutex::new(BTreeMap::new()),
                queues: Mutex::new(BTreeSet::new()),
                published: Mutex::new(Vec::new()),
                open_channels: AtomicUsize::new(0),
                next_channel_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn set_behavior(&self, behavior: ConfirmBehavior) {
        *self.inner.behavior.lock() = behavior;
    }

    /// Make subsequent exchange/queue declarations fail.
    pub fn refuse_declares(&self, refuse: bool) {
        self.inner.refuse_declares.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent `open_channel` calls fail.
    pub fn refuse_channels(&self, refuse: bool) {
        self.inner.refuse_channels.store(refuse, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.lock().clone()
    }

    pub fn declared_exchange(&self, name: &str) -> Option<ExchangeKind> {
        self.inner.exchanges.lock().get(name).copied()
    }

    pub fn declared_queue(&self, name: &str) -> bool {
        self.inner.queues.lock().contains(name)
    }

    /// Number of channels currently open. The publisher is expected to drive
    /// this back to zero on every terminal path.
    pub fn open_channels(&self) -> usize {
        self.inner.open_channels.load(Ordering::SeqCst)
    }
}

impl Default for EphemeralBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for EphemeralBroker {
    async fn open_channel(&self) -> ChannelResult<Box<dyn Channel>> {
        if self.inner.refuse_channels.load(Ordering::SeqCst) {
            return Err(ChannelError::Connection(
                "broker refused channel".to_string(),
            ));
        }
        self.inner.open_channels.fetch_add(1, Ordering::SeqCst);
        let channel_id = self.inner.next_channel_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(channel_id, "channel opened");
        Ok(Box::new(EphemeralChannel {
            channel_id,
            broker: Arc::clone(&self.inner),
            confirms_enabled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            listener: Mutex::new(None),
            next_seq: AtomicU64::new(0),
        }))
    }
}

struct EphemeralChannel {
    channel_id: u64,
    broker: Arc<BrokerInner>,
    confirms_enabled: AtomicBool,
    closed: AtomicBool,
    listener: Mutex<Option<ConfirmListener>>,
    next_seq: AtomicU64,
}

impl EphemeralChannel {
    fn ensure_open(&self) -> ChannelResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    fn notify(&self, confirmation: Confirmation) {
        let listener = self.listener.lock();
        if let Some(listener) = listener.as_ref() {
            listener(confirmation);
        }
    }
}

#[async_trait]
impl Channel for EphemeralChannel {
    async fn enable_confirms(&self) -> ChannelResult<()> {
        self.ensure_open()?;
        self.confirms_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_confirm(&self, listener: ConfirmListener) {
        *self.listener.lock() = Some(listener);
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: MessageProperties,
        body: Bytes,
    ) -> ChannelResult<SequenceNumber> {
        self.ensure_open()?;
        let behavior = *self.broker.behavior.lock();
        if behavior == ConfirmBehavior::FailPublish {
            return Err(ChannelError::Publish("injected channel fault".to_string()));
        }
        let seq_no = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.broker.published.lock().push(PublishedMessage {
            channel_id: self.channel_id,
            seq_no,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties,
            body,
        });
        if self.confirms_enabled.load(Ordering::SeqCst) {
            match behavior {
                ConfirmBehavior::AckEach => self.notify(Confirmation::Ack {
                    seq_no,
                    multiple: false,
                }),
                ConfirmBehavior::AckCumulative => self.notify(Confirmation::Ack {
                    seq_no,
                    multiple: true,
                }),
                ConfirmBehavior::NackEach => self.notify(Confirmation::Nack {
                    seq_no,
                    multiple: false,
                }),
                ConfirmBehavior::Silent | ConfirmBehavior::FailPublish => {}
            }
        }
        Ok(seq_no)
    }

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> ChannelResult<()> {
        self.ensure_open()?;
        if self.broker.refuse_declares.load(Ordering::SeqCst) {
            return Err(ChannelError::Declare(format!(
                "exchange declaration refused: {name}"
            )));
        }
        self.broker
            .exchanges
            .lock()
            .insert(name.to_string(), kind);
        Ok(())
    }

    async fn declare_queue(&self, name: &str, _options: QueueOptions) -> ChannelResult<()> {
        self.ensure_open()?;
        if self.broker.refuse_declares.load(Ordering::SeqCst) {
            return Err(ChannelError::Declare(format!(
                "queue declaration refused: {name}"
            )));
        }
        self.broker.queues.lock().insert(name.to_string());
        Ok(())
    }

    async fn close(&self) -> ChannelResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            *self.listener.lock() = None;
            self.broker.open_channels.fetch_sub(1, Ordering::SeqCst);
            tracing::trace!(channel_id = self.channel_id, "channel closed");
        }
        Ok(())
    }
}
