//! XRPL WebSocket Client Core
//!
//! Runtime-agnostic building blocks for a persistent client of the rippled
//! WebSocket API: configuration, error types, the connection state machine,
//! wire message classification, the callback table and the transport traits
//! that concrete WebSocket implementations plug into.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod callbacks;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod message;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use callbacks::{Callback, CallbackTable, ClientEvent, EventKind};
pub use config::{ClientConfig, DEFAULT_SERVER};
pub use errors::{ClientError, ClientResult, TransportError};
pub use ledger::LedgerSnapshot;
pub use message::{
    classify, parse_inbound, prepare_request, request_key, InboundMessage, Payload, PING_ID,
};
pub use state::{ConnectionState, StateTransitionError};
pub use transport::{Connector, TransportConnection, TransportEvent, TransportSink};
