//! User callbacks for connection lifecycle and stream events
//!
//! A [`CallbackTable`] is assembled before the client is built and is
//! read-only afterwards. Handlers are plain synchronous closures; the runtime
//! decides where they execute.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Kinds of events a handler can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Reconnect,
    Close,
    Error,
    Transaction,
    Ledger,
    Validation,
    Manifest,
}

/// An event delivered to a user handler
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The transport opened
    Open,
    /// The transport opened again after a lost connection
    Reconnect,
    /// The transport closed
    Close,
    /// A transport or protocol level error
    Error(String),
    /// `transaction` stream message
    Transaction(Value),
    /// `ledgerClosed` stream message
    Ledger(Value),
    /// `validationReceived` stream message
    Validation(Value),
    /// `manifestReceived` stream message
    Manifest(Value),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Open => EventKind::Open,
            ClientEvent::Reconnect => EventKind::Reconnect,
            ClientEvent::Close => EventKind::Close,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::Transaction(_) => EventKind::Transaction,
            ClientEvent::Ledger(_) => EventKind::Ledger,
            ClientEvent::Validation(_) => EventKind::Validation,
            ClientEvent::Manifest(_) => EventKind::Manifest,
        }
    }

    /// The message payload for stream events
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ClientEvent::Transaction(v)
            | ClientEvent::Ledger(v)
            | ClientEvent::Validation(v)
            | ClientEvent::Manifest(v) => Some(v),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Callback Table
// ----------------------------------------------------------------------------

/// A user supplied event handler
pub type Callback = Arc<dyn Fn(ClientEvent) + Send + Sync>;

/// Mapping from event kind to an optional handler
#[derive(Clone, Default)]
pub struct CallbackTable {
    handlers: HashMap<EventKind, Callback>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous handler
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn on_open<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Open, handler)
    }

    pub fn on_reconnect<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Reconnect, handler)
    }

    pub fn on_close<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Close, handler)
    }

    pub fn on_error<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Error, handler)
    }

    pub fn on_transaction<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Transaction, handler)
    }

    pub fn on_ledger<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Ledger, handler)
    }

    pub fn on_validation<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Validation, handler)
    }

    pub fn on_manifest<F: Fn(ClientEvent) + Send + Sync + 'static>(self, handler: F) -> Self {
        self.on(EventKind::Manifest, handler)
    }

    /// Handler registered for `kind`, if any
    pub fn get(&self, kind: EventKind) -> Option<Callback> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort_by_key(|k| format!("{:?}", k));
        f.debug_struct("CallbackTable").field("registered", &kinds).finish()
    }
}
