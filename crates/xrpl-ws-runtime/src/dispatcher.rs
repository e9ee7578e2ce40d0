//! Event Dispatcher
//!
//! Turns inbound text frames into actions: responses wake their waiting
//! request, pongs feed the heartbeat, stream events go to user callbacks.
//! Callbacks never run on the dispatching task; each invocation gets its own
//! blocking-pool thread so a slow handler cannot stall the connection.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::heartbeat::HeartbeatMonitor;
use crate::registry::RequestRegistry;
use xrpl_ws_core::{
    classify, parse_inbound, CallbackTable, ClientEvent, InboundMessage, LedgerSnapshot,
};

/// Routes classified inbound messages to their consumers
pub struct EventDispatcher {
    callbacks: CallbackTable,
    registry: Arc<RequestRegistry>,
    heartbeat: Arc<HeartbeatMonitor>,
    ledger: Arc<RwLock<LedgerSnapshot>>,
    disconnecting: Arc<AtomicBool>,
}

impl EventDispatcher {
    pub fn new(
        callbacks: CallbackTable,
        registry: Arc<RequestRegistry>,
        heartbeat: Arc<HeartbeatMonitor>,
        ledger: Arc<RwLock<LedgerSnapshot>>,
        disconnecting: Arc<AtomicBool>,
    ) -> Self {
        Self {
            callbacks,
            registry,
            heartbeat,
            ledger,
            disconnecting,
        }
    }

    /// Handle one raw inbound frame
    pub async fn dispatch(&self, raw: &str) {
        if self.disconnecting.load(Ordering::SeqCst) {
            return;
        }

        let data = match parse_inbound(raw) {
            Some(data) => data,
            None => {
                debug!(len = raw.len(), "Discarding message that is not a JSON object");
                return;
            }
        };

        let message = match classify(data) {
            Ok(message) => message,
            Err(err) => {
                error!("Dropping inbound message: {}", err);
                self.fire(ClientEvent::Error(err.to_string()));
                return;
            }
        };

        match message {
            InboundMessage::Pong => {
                debug!("Received pong");
                self.heartbeat.pong();
            }
            InboundMessage::Response { id, body } => {
                if !self.registry.resolve(&id, body) {
                    debug!(id = %id, "No pending request for response, dropping");
                }
            }
            InboundMessage::LedgerClosed(data) => {
                self.ledger.write().await.update_from(&data);
                self.fire(ClientEvent::Ledger(data));
            }
            InboundMessage::Transaction(data) => self.fire(ClientEvent::Transaction(data)),
            InboundMessage::ValidationReceived(data) => self.fire(ClientEvent::Validation(data)),
            InboundMessage::ManifestReceived(data) => self.fire(ClientEvent::Manifest(data)),
            InboundMessage::ProtocolError(data) => {
                let description = describe_error(&data);
                error!(error = %description, "Protocol error from server");
                self.fire(ClientEvent::Error(description));
            }
            InboundMessage::Unrecognized { kind, .. } => {
                warn!(kind = %kind, "Unhandled event type");
            }
        }
    }

    /// Invoke the handler registered for `event`, if any
    ///
    /// The handler runs on the blocking pool. A panic inside it is caught and
    /// logged.
    pub fn fire(&self, event: ClientEvent) {
        let kind = event.kind();
        let handler = match self.callbacks.get(kind) {
            Some(handler) => handler,
            None => return,
        };

        let invocation = tokio::task::spawn_blocking(move || handler(event));
        tokio::spawn(async move {
            if let Err(err) = invocation.await {
                if err.is_panic() {
                    error!(?kind, "Callback panicked");
                } else {
                    warn!(?kind, "Callback was cancelled");
                }
            }
        });
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }
}

fn describe_error(data: &Value) -> String {
    let code = data.get("error").and_then(Value::as_str);
    let message = data.get("error_message").and_then(Value::as_str);

    match (code, message) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        _ => format!("Unexpected message: {}", data),
    }
}
