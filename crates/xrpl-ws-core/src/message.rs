//! Wire messages
//!
//! Outbound requests are JSON objects of the form `{id, command, ...params}`.
//! Inbound messages carry a `type` discriminator; responses additionally carry
//! the `id` of the request they answer. Heartbeat pings reuse the request
//! shape with the reserved id `"ping"`.

use serde_json::{json, Map, Value};

use crate::errors::{ClientError, ClientResult};

/// Reserved request id used by heartbeat pings and their pongs
pub const PING_ID: &str = "ping";

/// Id of the ledger stream subscription sent right after every open
pub const LEDGER_SUBSCRIPTION_ID: u64 = 1;

/// A request or message body
pub type Payload = Map<String, Value>;

// ----------------------------------------------------------------------------
// Outbound Requests
// ----------------------------------------------------------------------------

/// Build an empty request for `command`
pub fn command(name: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("command".to_string(), Value::String(name.to_string()));
    payload
}

/// Heartbeat ping
pub fn ping_request() -> Value {
    json!({ "command": "ping", "id": PING_ID })
}

/// Subscription to the ledger stream issued after each successful open
pub fn subscribe_ledger_request() -> Value {
    json!({
        "command": "subscribe",
        "id": LEDGER_SUBSCRIPTION_ID,
        "streams": ["ledger"],
    })
}

/// Registry key for a request or response id
///
/// Strings are used as-is, numbers by their decimal rendering. Anything else,
/// including the empty string and zero, is not a usable id.
pub fn request_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if !is_zero(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_zero(n: &serde_json::Number) -> bool {
    n.as_f64() == Some(0.0)
}

/// Make a payload ready for transmission
///
/// Injects a fresh UUID when the payload has no `id` and returns the registry
/// key alongside the payload.
pub fn prepare_request(mut payload: Payload) -> ClientResult<(String, Payload)> {
    let key = match payload.get("id") {
        None | Some(Value::Null) => {
            let id = uuid::Uuid::new_v4().to_string();
            payload.insert("id".to_string(), Value::String(id.clone()));
            id
        }
        Some(id) => request_key(id)
            .ok_or_else(|| ClientError::invalid_request(format!("Unusable request id: {}", id)))?,
    };

    if key == PING_ID {
        return Err(ClientError::invalid_request("Request id \"ping\" is reserved for heartbeats"));
    }

    Ok((key, payload))
}

// ----------------------------------------------------------------------------
// Inbound Messages
// ----------------------------------------------------------------------------

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat answer
    Pong,
    /// Answer to a request issued by this client
    Response { id: String, body: Value },
    /// `ledgerClosed` stream event
    LedgerClosed(Value),
    /// `transaction` stream event
    Transaction(Value),
    /// `validationReceived` stream event
    ValidationReceived(Value),
    /// `manifestReceived` stream event
    ManifestReceived(Value),
    /// Message without a type, or carrying an `error` field
    ProtocolError(Value),
    /// Event of a type this client does not know
    Unrecognized { kind: String, body: Value },
}

impl InboundMessage {
    /// Name for logging
    pub fn kind_name(&self) -> &str {
        match self {
            InboundMessage::Pong => "pong",
            InboundMessage::Response { .. } => "response",
            InboundMessage::LedgerClosed(_) => "ledgerClosed",
            InboundMessage::Transaction(_) => "transaction",
            InboundMessage::ValidationReceived(_) => "validationReceived",
            InboundMessage::ManifestReceived(_) => "manifestReceived",
            InboundMessage::ProtocolError(_) => "error",
            InboundMessage::Unrecognized { kind, .. } => kind,
        }
    }
}

/// Parse raw text into a keyed JSON object
///
/// Returns `None` for text that is not JSON, and for JSON that is not an
/// object (arrays, scalars); such messages are not dispatchable.
pub fn parse_inbound(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Classify a parsed message by its `type` field
pub fn classify(data: Value) -> ClientResult<InboundMessage> {
    let kind = data.get("type").and_then(Value::as_str).map(str::to_owned);

    let message = match kind.as_deref() {
        Some("response") => {
            let id = data
                .get("id")
                .and_then(request_key)
                .ok_or_else(|| ClientError::response_format("valid id not found in response", data.clone()))?;

            if id == PING_ID {
                InboundMessage::Pong
            } else {
                InboundMessage::Response { id, body: data }
            }
        }
        Some("ledgerClosed") => InboundMessage::LedgerClosed(data),
        Some("transaction") => InboundMessage::Transaction(data),
        Some("validationReceived") => InboundMessage::ValidationReceived(data),
        Some("manifestReceived") => InboundMessage::ManifestReceived(data),
        Some(other) if data.get("error").is_none() => InboundMessage::Unrecognized {
            kind: other.to_string(),
            body: data,
        },
        _ => InboundMessage::ProtocolError(data),
    };

    Ok(message)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
