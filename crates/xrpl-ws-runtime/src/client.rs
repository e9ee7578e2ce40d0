//! Client Facade
//!
//! [`Client`] is the handle applications hold. It is cheap to clone; every
//! clone drives the same connection. Build one with [`ClientBuilder`]:
//!
//! ```ignore
//! let client = ClientBuilder::new(ClientConfig::default())
//!     .with_connector(WebSocketConnector::new())
//!     .with_callbacks(CallbackTable::new().on_ledger(|event| println!("{:?}", event)))
//!     .build()?;
//!
//! client.connect(true).await?;
//! let info = client.server_info().await?;
//! client.disconnect().await;
//! ```

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot::error::RecvError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::supervisor::{ConnectionSupervisor, Transition};
use xrpl_ws_core::{
    prepare_request, CallbackTable, ClientConfig, ClientError, ClientResult, ConnectionState,
    Connector, LedgerSnapshot,
};

// ----------------------------------------------------------------------------
// Client Builder
// ----------------------------------------------------------------------------

/// Builder for a [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    callbacks: CallbackTable,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            callbacks: CallbackTable::new(),
            connector: None,
        }
    }

    /// Set the event handlers
    pub fn with_callbacks(mut self, callbacks: CallbackTable) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Set the transport used to reach the server
    pub fn with_connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set an already shared transport
    pub fn with_shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Validate the configuration and create the client
    ///
    /// Must be called from within a tokio runtime; the runtime is captured
    /// for [`Client::send_blocking`].
    pub fn build(self) -> ClientResult<Client> {
        self.config.validate()?;

        let connector = self
            .connector
            .ok_or_else(|| ClientError::config_error("No transport connector configured"))?;
        let runtime = Handle::try_current()
            .map_err(|_| ClientError::config_error("Client must be built inside a tokio runtime"))?;

        debug!(server = %self.config.server, "Building client");
        let supervisor = ConnectionSupervisor::new(self.config, connector, self.callbacks);

        Ok(Client {
            inner: Arc::new(ClientInner { supervisor, runtime }),
        })
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

struct ClientInner {
    supervisor: ConnectionSupervisor,
    runtime: Handle,
}

/// Persistent, auto-reconnecting connection to a rippled server
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Start the background connection task
    ///
    /// With `wait_for_open` the call returns once the connection is open,
    /// retrying failed attempts for as long as it takes, or fails with
    /// `Disconnected` if [`disconnect`](Self::disconnect) intervenes. Calling
    /// it while the task is already running only waits.
    pub async fn connect(&self, wait_for_open: bool) -> ClientResult<()> {
        let supervisor = &self.inner.supervisor;
        if !supervisor.start().await {
            debug!("Connection supervisor already running");
        }

        if !wait_for_open {
            return Ok(());
        }

        let mut state = supervisor.watch_state();
        let reached = state
            .wait_for(|s| match s {
                ConnectionState::Connected | ConnectionState::Disconnecting => true,
                ConnectionState::Disconnected => supervisor.is_disconnect_requested(),
                _ => false,
            })
            .await
            .map(|s| *s);

        match reached {
            Ok(ConnectionState::Connected) => Ok(()),
            _ => Err(ClientError::disconnected("Disconnected before the connection opened")),
        }
    }

    /// Close the connection for good
    ///
    /// Pending requests fail with `Disconnected` and no reconnect follows.
    /// Idempotent.
    pub async fn disconnect(&self) {
        info!("Disconnecting from server");
        self.inner.supervisor.stop().await;
    }

    /// Drop the current connection and let the supervisor open a new one
    pub fn reconnect(&self) -> ClientResult<()> {
        if self.inner.supervisor.request_reconnect("reconnect requested") {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Send a request and wait for its correlated response
    ///
    /// `payload` must be a JSON object. A missing `id` is filled with a fresh
    /// UUID; the response is returned exactly as received.
    pub async fn send(&self, payload: Value) -> ClientResult<Value> {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(ClientError::invalid_request(format!(
                    "Payload must be a JSON object, got {}",
                    other
                )))
            }
        };
        let (id, payload) = prepare_request(payload)?;

        let supervisor = &self.inner.supervisor;
        let sink = supervisor.sink().await.ok_or(ClientError::NotConnected)?;
        let text = serde_json::to_string(&payload)?;

        let registry = supervisor.registry();
        let mut receiver = registry.register(&id)?;
        if supervisor.is_disconnect_requested() {
            registry.remove(&id);
            return Err(ClientError::disconnected("Client disconnected"));
        }

        // The write and the wait for the response share one deadline. A
        // disconnect settles the request even while the write is stalled.
        let exchange = async {
            debug!(id = %id, "Sending request");
            tokio::select! {
                written = sink.send(text) => {
                    if let Err(err) = written {
                        registry.remove(&id);
                        warn!(id = %id, "Did not send request, client not connected: {}", err);
                        return Err(ClientError::NotConnected);
                    }
                }
                settled = &mut receiver => return settle(settled),
            }
            settle(receiver.await)
        };

        let limit = supervisor.config().response_timeout;
        let outcome = timeout(limit, exchange).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                registry.remove(&id);
                debug!(id = %id, "Request timed out");
                Err(ClientError::timeout(id, limit.as_millis() as u64))
            }
        }
    }

    /// Blocking variant of [`send`](Self::send) for synchronous code such as
    /// event handlers
    ///
    /// # Panics
    ///
    /// Panics when called from an async context on a runtime worker thread.
    pub fn send_blocking(&self, payload: Value) -> ClientResult<Value> {
        self.inner.runtime.block_on(self.send(payload))
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Last ledger close reported by the server
    pub async fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.inner.supervisor.ledger_snapshot().await
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.inner.supervisor.registry().len()
    }

    pub fn config(&self) -> &ClientConfig {
        self.inner.supervisor.config()
    }

    /// Wait until the connection reaches `target`, at most `within`
    pub async fn wait_for_state(&self, target: ConnectionState, within: Duration) -> bool {
        let mut state = self.inner.supervisor.watch_state();
        let reached = timeout(within, state.wait_for(|s| *s == target)).await;
        matches!(reached, Ok(Ok(_)))
    }

    /// Most recent connection state changes, oldest first
    pub async fn state_transitions(&self) -> Vec<Transition> {
        self.inner.supervisor.transitions().await
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.inner.supervisor
    }
}

fn settle(outcome: Result<ClientResult<Value>, RecvError>) -> ClientResult<Value> {
    outcome.unwrap_or_else(|_| Err(ClientError::disconnected("Request abandoned")))
}
