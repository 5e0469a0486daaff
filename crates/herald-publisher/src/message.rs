// Publish request metadata and the outbound property mapping.
use bytes::Bytes;
use herald_transport::{DeliveryMode, MessageProperties};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::target::PublisherTarget;

pub(crate) const CONTENT_TYPE_HEADER: &str = "content_type";
pub(crate) const USER_ID_HEADER: &str = "user_id";
pub(crate) const TRANSACTION_ID_HEADER: &str = "transaction_id";

/// One message to publish, with its header metadata. Immutable once
/// submitted to the front door.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub message_id: String,
    /// Originating application; mapped to the app-id property.
    pub originator: String,
    pub user_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Additional caller-supplied headers. Fixed binding-argument headers
    /// take precedence on collision.
    pub headers: BTreeMap<String, String>,
    pub content_type: String,
    pub charset: Option<String>,
    pub body: Bytes,
}

impl PublishRequest {
    pub fn new(
        message_id: impl Into<String>,
        originator: impl Into<String>,
        content_type: impl Into<String>,
        body: Bytes,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            originator: originator.into(),
            user_id: None,
            transaction_id: None,
            headers: BTreeMap::new(),
            content_type: content_type.into(),
            charset: None,
            body,
        }
    }
}

/// Map a request onto the wire properties for its target.
///
/// Persistent delivery always. The content type is duplicated into a header
/// so header-exchange routing can match on it. Header precedence, lowest to
/// highest: caller headers, derived metadata headers, fixed binding-argument
/// headers (the configured binding wins on collision).
pub(crate) fn build_properties(
    request: &PublishRequest,
    target: &PublisherTarget,
) -> MessageProperties {
    let mut headers = request.headers.clone();
    headers.insert(CONTENT_TYPE_HEADER.to_string(), request.content_type.clone());
    if let Some(user_id) = &request.user_id {
        headers.insert(USER_ID_HEADER.to_string(), user_id.clone());
    }
    if let Some(transaction_id) = &request.transaction_id {
        headers.insert(TRANSACTION_ID_HEADER.to_string(), transaction_id.clone());
    }
    if let Some(binding) = target.binding_headers() {
        for (key, value) in binding {
            headers.insert(key.clone(), value.clone());
        }
    }
    MessageProperties {
        message_id: Some(request.message_id.clone()),
        app_id: Some(request.originator.clone()),
        content_type: Some(request.content_type.clone()),
        content_encoding: request.charset.clone(),
        timestamp: Some(unix_timestamp()),
        delivery_mode: DeliveryMode::Persistent,
        headers,
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
