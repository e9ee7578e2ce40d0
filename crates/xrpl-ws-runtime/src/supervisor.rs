//! Connection Supervisor
//!
//! Owns the single background task that keeps the connection alive:
//! - Opening the transport, bounded by the connection timeout
//! - Running the inbound loop and heartbeat while connected
//! - Waiting the reconnect interval and retrying, forever
//! - Graceful shutdown with a bounded grace period
//!
//! Connection state is published through a `watch` channel and every change
//! is validated against the [`ConnectionState`] transition table. Timers and
//! reconnect requests reach the task as [`SupervisorSignal`]s tagged with the
//! epoch they belong to; signals from an earlier epoch are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::dispatcher::EventDispatcher;
use crate::heartbeat::HeartbeatMonitor;
use crate::registry::RequestRegistry;
use xrpl_ws_core::{
    message::{ping_request, subscribe_ledger_request},
    CallbackTable, ClientConfig, ClientError, ClientEvent, ClientResult, ConnectionState,
    Connector, LedgerSnapshot, TransportConnection, TransportError, TransportEvent, TransportSink,
};

const TRANSITION_LOG_CAPACITY: usize = 64;

/// A recorded `(from, to)` state change
pub type Transition = (ConnectionState, ConnectionState);

// ----------------------------------------------------------------------------
// Supervisor Signals
// ----------------------------------------------------------------------------

/// Requests delivered to the supervisor task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// The ping timer fired
    SendPing { epoch: u64 },
    /// Tear down the current connection and reconnect
    Reconnect { epoch: u64, reason: String },
}

impl SupervisorSignal {
    pub fn epoch(&self) -> u64 {
        match self {
            SupervisorSignal::SendPing { epoch } | SupervisorSignal::Reconnect { epoch, .. } => *epoch,
        }
    }
}

// ----------------------------------------------------------------------------
// Shared Context
// ----------------------------------------------------------------------------

struct SupervisorContext {
    config: ClientConfig,
    connector: Arc<dyn Connector>,

    // Connection state
    state: watch::Sender<ConnectionState>,
    transitions: Mutex<VecDeque<Transition>>,
    sink: RwLock<Option<Arc<dyn TransportSink>>>,
    epoch: AtomicU64,

    // Collaborators
    registry: Arc<RequestRegistry>,
    heartbeat: Arc<HeartbeatMonitor>,
    dispatcher: EventDispatcher,
    ledger: Arc<RwLock<LedgerSnapshot>>,

    // Flags and signalling
    disconnect_requested: Arc<AtomicBool>,
    reconnect_required: AtomicBool,
    signals_tx: mpsc::UnboundedSender<SupervisorSignal>,
    signals_rx: Mutex<mpsc::UnboundedReceiver<SupervisorSignal>>,
    shutdown: watch::Sender<bool>,
}

impl SupervisorContext {
    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn disconnecting(&self) -> bool {
        self.disconnect_requested.load(Ordering::SeqCst)
    }

    /// Move to `next` if the transition table allows it
    async fn transition(&self, next: ConnectionState) -> bool {
        let mut log = self.transitions.lock().await;
        let current = self.current_state();

        match current.transition(next) {
            Ok(state) => {
                self.state.send_replace(state);
                record_transition(&mut log, current, state);
                debug!(from = %current, to = %state, "Connection state changed");
                true
            }
            Err(err) => {
                warn!("Rejected state change: {}", err);
                false
            }
        }
    }

    /// Set the state without consulting the transition table
    async fn force_state(&self, next: ConnectionState) {
        let mut log = self.transitions.lock().await;
        let previous = self.state.send_replace(next);
        if previous != next {
            record_transition(&mut log, previous, next);
            warn!(from = %previous, to = %next, "Connection state forced");
        }
    }

    /// Surface an error through `on_error` unless a disconnect is in progress
    fn report_error(&self, message: String) {
        if self.disconnecting() {
            debug!("Ignoring error during disconnect: {}", message);
            return;
        }
        self.dispatcher.fire(ClientEvent::Error(message));
    }

    async fn send_ping(&self, sink: &Arc<dyn TransportSink>, epoch: u64) {
        debug!(epoch, "Sending ping");
        match send_within(sink, ping_request().to_string(), self.config.connection_timeout).await {
            Ok(()) => self.heartbeat.ping_sent().await,
            Err(err) => warn!(epoch, "Failed to send ping: {}", err),
        }
    }
}

fn record_transition(log: &mut VecDeque<Transition>, from: ConnectionState, to: ConnectionState) {
    if log.len() == TRANSITION_LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back((from, to));
}

async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

/// Write one frame from the supervisor task, giving up after `limit`
async fn send_within(sink: &Arc<dyn TransportSink>, text: String, limit: Duration) -> Result<(), TransportError> {
    match timeout(limit, sink.send(text)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::SendFailed {
            reason: format!("write stalled for {}ms", limit.as_millis()),
        }),
    }
}

/// Close the transport, giving up after `limit`
async fn close_within(sink: &Arc<dyn TransportSink>, limit: Duration) -> Result<(), TransportError> {
    match timeout(limit, sink.close()).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::CloseFailed {
            reason: format!("close stalled for {}ms", limit.as_millis()),
        }),
    }
}

// ----------------------------------------------------------------------------
// Connection Supervisor
// ----------------------------------------------------------------------------

/// Supervises the background connection task
pub struct ConnectionSupervisor {
    context: Arc<SupervisorContext>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Create a supervisor; nothing runs until [`start`](Self::start)
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>, callbacks: CallbackTable) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);

        let registry = Arc::new(RequestRegistry::new());
        let heartbeat = Arc::new(HeartbeatMonitor::new(&config, signals_tx.clone()));
        let ledger = Arc::new(RwLock::new(LedgerSnapshot::default()));
        let disconnect_requested = Arc::new(AtomicBool::new(false));

        let dispatcher = EventDispatcher::new(
            callbacks,
            Arc::clone(&registry),
            Arc::clone(&heartbeat),
            Arc::clone(&ledger),
            Arc::clone(&disconnect_requested),
        );

        let context = SupervisorContext {
            config,
            connector,
            state,
            transitions: Mutex::new(VecDeque::with_capacity(TRANSITION_LOG_CAPACITY)),
            sink: RwLock::new(None),
            epoch: AtomicU64::new(0),
            registry,
            heartbeat,
            dispatcher,
            ledger,
            disconnect_requested,
            reconnect_required: AtomicBool::new(false),
            signals_tx,
            signals_rx: Mutex::new(signals_rx),
            shutdown,
        };

        Self {
            context: Arc::new(context),
            task: Mutex::new(None),
        }
    }

    /// Spawn the background task
    ///
    /// Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                return false;
            }
        }

        let context = &self.context;
        context.disconnect_requested.store(false, Ordering::SeqCst);
        context.reconnect_required.store(false, Ordering::SeqCst);
        context.shutdown.send_replace(false);

        info!(server = %context.config.server, "Starting connection supervisor");
        *task = Some(tokio::spawn(run(Arc::clone(context))));
        true
    }

    /// Deliberately disconnect and stop the background task
    ///
    /// Suppresses every further reconnect, closes the transport, cancels all
    /// timers and fails pending requests with `Disconnected`. The task gets
    /// `shutdown_grace` to exit before it is aborted. Calling this again, or
    /// on a supervisor that never started, is harmless.
    pub async fn stop(&self) {
        let context = &self.context;
        if !context.disconnect_requested.swap(true, Ordering::SeqCst) {
            info!("Disconnect requested");
        }
        context.reconnect_required.store(false, Ordering::SeqCst);
        context.shutdown.send_replace(true);

        let sink = context.sink.write().await.take();
        if let Some(sink) = sink {
            if let Err(err) = close_within(&sink, context.config.shutdown_grace).await {
                warn!("Close failed during disconnect: {}", err);
            }
        }

        context.heartbeat.stop().await;

        let failed = context.registry.fail_all("client disconnected");
        if failed > 0 {
            info!(failed, "Failed pending requests on disconnect");
        }

        let handle = self.task.lock().await.take();
        if let Some(mut handle) = handle {
            match timeout(context.config.shutdown_grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => error!("Connection supervisor panicked"),
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(
                        grace_ms = context.config.shutdown_grace.as_millis() as u64,
                        "Connection supervisor did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }

        if context.current_state() != ConnectionState::Disconnected {
            context.force_state(ConnectionState::Disconnected).await;
        }
    }

    /// Close the current connection so the supervisor reconnects
    ///
    /// Returns `false` when there is no open connection to recycle.
    pub fn request_reconnect(&self, reason: &str) -> bool {
        let context = &self.context;
        if context.current_state() != ConnectionState::Connected {
            return false;
        }

        context.reconnect_required.store(true, Ordering::SeqCst);
        let epoch = context.epoch.load(Ordering::SeqCst);
        context
            .signals_tx
            .send(SupervisorSignal::Reconnect {
                epoch,
                reason: reason.to_string(),
            })
            .is_ok()
    }

    pub fn state(&self) -> ConnectionState {
        self.context.current_state()
    }

    /// Receiver observing every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.context.state.subscribe()
    }

    /// Most recent state changes, oldest first
    pub async fn transitions(&self) -> Vec<Transition> {
        self.context.transitions.lock().await.iter().copied().collect()
    }

    /// Sink of the open connection, if any
    pub async fn sink(&self) -> Option<Arc<dyn TransportSink>> {
        self.context.sink.read().await.clone()
    }

    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.context.registry
    }

    pub fn heartbeat(&self) -> &Arc<HeartbeatMonitor> {
        &self.context.heartbeat
    }

    pub async fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.context.ledger.read().await.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.context.config
    }

    /// Generation of the current connection attempt
    pub fn epoch(&self) -> u64 {
        self.context.epoch.load(Ordering::SeqCst)
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.context.disconnecting()
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.task.lock().await.as_ref(), Some(handle) if !handle.is_finished())
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Supervisor Task
// ----------------------------------------------------------------------------

async fn run(context: Arc<SupervisorContext>) {
    let mut signals = context.signals_rx.lock().await;
    let mut shutdown = context.shutdown.subscribe();

    while !context.disconnecting() {
        let epoch = context.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if !context.transition(ConnectionState::Connecting).await {
            break;
        }

        match open(&context, &mut shutdown).await {
            Some(Ok(connection)) => {
                run_connection(&context, connection, epoch, &mut signals, &mut shutdown).await;
            }
            Some(Err(err)) => {
                warn!(epoch, "Connection attempt failed: {}", err);
                context.report_error(err.to_string());
            }
            None => break,
        }

        if context.disconnecting() {
            break;
        }

        context.reconnect_required.store(true, Ordering::SeqCst);
        context.transition(ConnectionState::Reconnecting).await;
        info!(
            epoch,
            "Attempting to connect again in {}ms",
            context.config.reconnect_interval.as_millis()
        );

        tokio::select! {
            _ = sleep(context.config.reconnect_interval) => {}
            _ = shutdown_signalled(&mut shutdown) => break,
        }
    }

    context.transition(ConnectionState::Disconnecting).await;
    context.transition(ConnectionState::Disconnected).await;
    info!("Connection supervisor stopped");
}

/// Open the transport; `None` if shutdown was requested meanwhile
async fn open(
    context: &SupervisorContext,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<ClientResult<TransportConnection>> {
    let server = &context.config.server;
    let limit = context.config.connection_timeout;
    info!(url = %server, "Connecting");

    tokio::select! {
        result = timeout(limit, context.connector.connect(server)) => Some(match result {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(err)) => Err(ClientError::Transport(err)),
            Err(_) => Err(ClientError::Transport(TransportError::ConnectFailed {
                url: server.clone(),
                reason: format!("timed out after {}ms", limit.as_millis()),
            })),
        }),
        _ = shutdown_signalled(shutdown) => None,
    }
}

/// Drive one open connection until it closes or must be recycled
async fn run_connection(
    context: &SupervisorContext,
    connection: TransportConnection,
    epoch: u64,
    signals: &mut mpsc::UnboundedReceiver<SupervisorSignal>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let TransportConnection { sink, mut events } = connection;

    *context.sink.write().await = Some(Arc::clone(&sink));
    context.transition(ConnectionState::Connected).await;
    info!(epoch, url = %context.config.server, "Connection opened");

    context.heartbeat.start(epoch).await;
    context.send_ping(&sink, epoch).await;

    debug!(epoch, "Subscribing to ledger stream");
    let subscribe = subscribe_ledger_request().to_string();
    if let Err(err) = send_within(&sink, subscribe, context.config.connection_timeout).await {
        warn!(epoch, "Failed to subscribe to ledger stream: {}", err);
    }

    context.dispatcher.fire(ClientEvent::Open);
    if context.reconnect_required.swap(false, Ordering::SeqCst) {
        info!(epoch, "Connection reconnected");
        context.dispatcher.fire(ClientEvent::Reconnect);
    }

    let still_open = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TransportEvent::Message(text)) => {
                    if context.disconnecting() {
                        continue;
                    }
                    context.heartbeat.reset().await;
                    context.dispatcher.dispatch(&text).await;
                }
                Some(TransportEvent::Closed(reason)) => {
                    info!(epoch, reason = reason.as_deref().unwrap_or("none"), "Connection closed");
                    break false;
                }
                Some(TransportEvent::Error(err)) => {
                    if !context.disconnecting() {
                        error!(epoch, "Connection error: {}", err);
                    }
                    context.report_error(err.to_string());
                    break false;
                }
                None => {
                    info!(epoch, "Transport event stream ended");
                    break false;
                }
            },
            Some(signal) = signals.recv() => {
                if signal.epoch() != epoch {
                    debug!(epoch, stale = signal.epoch(), "Discarding stale supervisor signal");
                    continue;
                }
                match signal {
                    SupervisorSignal::SendPing { .. } => context.send_ping(&sink, epoch).await,
                    SupervisorSignal::Reconnect { reason, .. } => {
                        warn!(epoch, reason = %reason, "Issuing reconnect");
                        context.reconnect_required.store(true, Ordering::SeqCst);
                        break true;
                    }
                }
            }
            _ = shutdown_signalled(shutdown) => break true,
        }
    };

    context.sink.write().await.take();
    context.heartbeat.stop().await;

    if still_open {
        if let Err(err) = close_within(&sink, context.config.shutdown_grace).await {
            debug!(epoch, "Close after teardown failed: {}", err);
        }
    }

    context.dispatcher.fire(ClientEvent::Close);
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrpl_ws_core::testing::MockConnector;

    fn config() -> ClientConfig {
        ClientConfig::with_server("ws://mock")
            .with_reconnect_interval(Duration::from_millis(30))
            .with_shutdown_grace(Duration::from_millis(200))
    }

    async fn wait_for(supervisor: &ConnectionSupervisor, target: ConnectionState) {
        let mut state = supervisor.watch_state();
        timeout(Duration::from_secs(2), state.wait_for(|s| *s == target))
            .await
            .expect("state not reached")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn test_start_connects_and_subscribes() {
        let connector = MockConnector::new();
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector.clone()), CallbackTable::new());

        assert!(supervisor.start().await);
        assert!(!supervisor.start().await);
        wait_for(&supervisor, ConnectionState::Connected).await;
        assert_eq!(supervisor.epoch(), 1);
        assert!(supervisor.sink().await.is_some());

        let link = connector.latest().unwrap();
        let subscribe = link
            .wait_for_sent(|v| v["command"] == "subscribe", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(subscribe, serde_json::json!({"command": "subscribe", "id": 1, "streams": ["ledger"]}));
        assert_eq!(link.sent()[0], ping_request());

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_server_close_triggers_reconnect() {
        let connector = MockConnector::new();
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector.clone()), CallbackTable::new());
        supervisor.start().await;
        wait_for(&supervisor, ConnectionState::Connected).await;

        connector.latest().unwrap().close();
        let second = connector.wait_for_connections(2, Duration::from_secs(2)).await;
        assert!(second.is_some());
        wait_for(&supervisor, ConnectionState::Connected).await;
        assert_eq!(supervisor.epoch(), 2);

        supervisor.stop().await;
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connects_are_retried() {
        let connector = MockConnector::new();
        connector.fail_next_connects(2);
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector.clone()), CallbackTable::new());

        supervisor.start().await;
        wait_for(&supervisor, ConnectionState::Connected).await;
        assert_eq!(connector.connect_attempts(), 3);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_stale_reconnect_signal_is_discarded() {
        let connector = MockConnector::new();
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector.clone()), CallbackTable::new());
        supervisor.start().await;
        wait_for(&supervisor, ConnectionState::Connected).await;

        supervisor
            .context
            .signals_tx
            .send(SupervisorSignal::Reconnect {
                epoch: 0,
                reason: "stale".to_string(),
            })
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.connection_count(), 1);
        assert_eq!(supervisor.state(), ConnectionState::Connected);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_request_reconnect_recycles_connection() {
        let connector = MockConnector::new();
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector.clone()), CallbackTable::new());
        assert!(!supervisor.request_reconnect("not connected yet"));

        supervisor.start().await;
        wait_for(&supervisor, ConnectionState::Connected).await;
        assert!(supervisor.request_reconnect("manual"));

        connector.wait_for_connections(2, Duration::from_secs(2)).await.unwrap();
        assert!(connector.link(0).unwrap().is_closed());

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_transitions_follow_the_table() {
        let connector = MockConnector::new();
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector.clone()), CallbackTable::new());
        supervisor.start().await;
        wait_for(&supervisor, ConnectionState::Connected).await;
        supervisor.stop().await;

        let transitions = supervisor.transitions().await;
        assert_eq!(
            transitions,
            vec![
                (ConnectionState::Disconnected, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Connected),
                (ConnectionState::Connected, ConnectionState::Disconnecting),
                (ConnectionState::Disconnecting, ConnectionState::Disconnected),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_safe_before_start() {
        let connector = MockConnector::new();
        let supervisor = ConnectionSupervisor::new(config(), Arc::new(connector), CallbackTable::new());

        supervisor.stop().await;
        supervisor.stop().await;
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(!supervisor.is_running().await);
    }
}
