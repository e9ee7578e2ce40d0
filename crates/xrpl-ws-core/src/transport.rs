//! Transport Trait Definitions
//!
//! The client never touches sockets directly. A [`Connector`] opens a duplex
//! text stream and hands back a [`TransportConnection`]: a sink for outbound
//! frames and a channel of inbound [`TransportEvent`]s. A successful
//! `connect` is the *opened* event.
//!
//! ## Implementations
//!
//! - `WebSocketConnector` in the `xrpl-ws-tungstenite` crate
//! - `MockConnector` in [`crate::testing`] for tests

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::TransportError;

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Inbound event produced by an open transport
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame
    Message(String),
    /// The peer or the local side closed the stream
    Closed(Option<String>),
    /// The stream failed; no further events follow
    Error(TransportError),
}

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Outbound half of an open transport
#[async_trait::async_trait]
pub trait TransportSink: Send + Sync {
    /// Write one text frame
    async fn send(&self, text: String) -> Result<(), TransportError>;

    /// Close the stream
    ///
    /// The inbound channel reports `Closed` once the close completes.
    async fn close(&self) -> Result<(), TransportError>;
}

/// An open transport
pub struct TransportConnection {
    pub sink: Arc<dyn TransportSink>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportConnection {
    pub fn new(sink: Arc<dyn TransportSink>, events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { sink, events }
    }
}

/// Opens transports to a server URL
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError>;
}
