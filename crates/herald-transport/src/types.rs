// Shared types crossing the transport boundary.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Channel-scoped, strictly increasing identifier assigned to each publish
/// attempt on that channel. The first publish on a fresh channel is 0.
pub type SequenceNumber = u64;

/// Broker-originated confirmation for a published message.
///
/// `multiple = true` is the cumulative form: the event covers every
/// outstanding sequence number less than or equal to `seq_no`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Ack {
        seq_no: SequenceNumber,
        multiple: bool,
    },
    Nack {
        seq_no: SequenceNumber,
        multiple: bool,
    },
}

impl Confirmation {
    pub fn seq_no(&self) -> SequenceNumber {
        match self {
            Confirmation::Ack { seq_no, .. } | Confirmation::Nack { seq_no, .. } => *seq_no,
        }
    }

    pub fn is_multiple(&self) -> bool {
        match self {
            Confirmation::Ack { multiple, .. } | Confirmation::Nack { multiple, .. } => *multiple,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Transient,
    Persistent,
}

/// Exchange type used when declaring the publisher's target exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Headers,
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Topic => "topic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(ExchangeKind::Direct),
            "fanout" => Some(ExchangeKind::Fanout),
            "headers" => Some(ExchangeKind::Headers),
            "topic" => Some(ExchangeKind::Topic),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue declaration options. The publisher declares durable,
/// non-exclusive, non-auto-delete queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// Outbound message representation handed to `Channel::publish`.
///
/// Built by the publisher from a `PublishRequest`; the transport forwards it
/// verbatim. Headers are plain string pairs, which is all herald routing
/// needs (header exchanges match on string equality).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub message_id: Option<String>,
    pub app_id: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub timestamp: Option<u64>,
    pub delivery_mode: DeliveryMode,
    pub headers: BTreeMap<String, String>,
}
