//! XRPL WebSocket Client Runtime
//!
//! This crate runs the connection described by `xrpl-ws-core`:
//! - `Client`: the facade applications hold (connect, send, disconnect)
//! - `ConnectionSupervisor`: the background task owning the transport lifecycle
//! - `HeartbeatMonitor`: ping/pong and idle liveness timers
//! - `RequestRegistry`: correlation of responses to in-flight requests
//! - `EventDispatcher`: routing of inbound messages to waiters and callbacks
//!
//! Transports plug in through the `Connector` trait; see the
//! `xrpl-ws-tungstenite` crate for the WebSocket implementation.

pub mod client;
pub mod commands;
pub mod dispatcher;
pub mod heartbeat;
pub mod registry;
pub mod supervisor;

pub use client::{Client, ClientBuilder};
pub use dispatcher::EventDispatcher;
pub use heartbeat::HeartbeatMonitor;
pub use registry::{PendingRequest, RequestRegistry, ResponseReceiver};
pub use supervisor::{ConnectionSupervisor, SupervisorSignal, Transition};

// Re-export core types for convenience
pub use xrpl_ws_core::{
    CallbackTable, ClientConfig, ClientError, ClientEvent, ClientResult, ConnectionState,
    Connector, EventKind, LedgerSnapshot, TransportError,
};
