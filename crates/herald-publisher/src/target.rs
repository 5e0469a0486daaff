// Publish destination, built once from validated configuration.
use herald_transport::ExchangeKind;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::PublisherConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no exchange or routing key configured; publisher has no destination")]
    MissingDestination,
    #[error("routing key and binding arguments are mutually exclusive")]
    RoutingConflict,
}

/// How messages reach their bindings on a named exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Routing-key based. The empty key is legal (fanout exchanges ignore it).
    Key(String),
    /// Header-exchange routing on a fixed key/value set; publishes use the
    /// empty routing key and carry the set as message headers.
    Headers(BTreeMap<String, String>),
}

/// Where this publisher sends every message. Immutable after construction;
/// owned by the front door for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherTarget {
    Exchange {
        name: String,
        kind: ExchangeKind,
        routing: Routing,
    },
    /// No exchange configured: publish through the default exchange straight
    /// to a durable queue of this name.
    Queue { name: String },
}

impl PublisherTarget {
    /// Validate the configured destination.
    ///
    /// Invariants enforced here, failing construction:
    /// - an exchange name and a routing key must not both be absent;
    /// - a routing key and binding arguments must not both be present.
    pub fn from_config(config: &PublisherConfig) -> Result<Self, ConfigError> {
        if config.routing_key.is_some() && !config.binding_args.is_empty() {
            return Err(ConfigError::RoutingConflict);
        }
        match (&config.exchange, &config.routing_key) {
            (Some(exchange), routing_key) => {
                let routing = if let Some(key) = routing_key {
                    Routing::Key(key.clone())
                } else if !config.binding_args.is_empty() {
                    Routing::Headers(config.binding_args.clone())
                } else {
                    // Exchange with neither key nor binding args: legal for
                    // fanout-style routing, published with the empty key.
                    Routing::Key(String::new())
                };
                Ok(PublisherTarget::Exchange {
                    name: exchange.clone(),
                    kind: config.exchange_type,
                    routing,
                })
            }
            (None, Some(queue)) => Ok(PublisherTarget::Queue {
                name: queue.clone(),
            }),
            (None, None) => Err(ConfigError::MissingDestination),
        }
    }

    /// Exchange argument for `Channel::publish`; empty for the default
    /// exchange (direct-to-queue).
    pub fn exchange_name(&self) -> &str {
        match self {
            PublisherTarget::Exchange { name, .. } => name,
            PublisherTarget::Queue { .. } => "",
        }
    }

    /// Routing key argument for `Channel::publish`. Header-routed targets
    /// use the empty key; queue targets use the queue name.
    pub fn routing_key(&self) -> &str {
        match self {
            PublisherTarget::Exchange { routing, .. } => match routing {
                Routing::Key(key) => key,
                Routing::Headers(_) => "",
            },
            PublisherTarget::Queue { name } => name,
        }
    }

    /// Fixed headers merged into every outgoing message, if header-routed.
    pub fn binding_headers(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            PublisherTarget::Exchange {
                routing: Routing::Headers(headers),
                ..
            } => Some(headers),
            _ => None,
        }
    }
}
