//! Mock Transport for Testing
//!
//! An in-memory [`Connector`] that plays the server side of every connection
//! it opens. Tests can inspect outbound frames, inject inbound frames, close
//! or fail a link, make connection attempts fail, and install a responder
//! that answers requests automatically.

use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::errors::TransportError;
use crate::message::PING_ID;
use crate::transport::{Connector, TransportConnection, TransportEvent, TransportSink};

/// Builds a reply for an outbound request, or `None` to stay silent
pub type Responder = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ----------------------------------------------------------------------------
// Mock Connector
// ----------------------------------------------------------------------------

/// Scripted connector handing out in-memory links
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    links: Mutex<Vec<MockLink>>,
    connect_attempts: AtomicUsize,
    failures_remaining: AtomicUsize,
    auto_pong: AtomicBool,
    responder: Mutex<Option<Responder>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer heartbeat pings with a pong
    pub fn with_auto_pong(self, enabled: bool) -> Self {
        self.set_auto_pong(enabled);
        self
    }

    pub fn set_auto_pong(&self, enabled: bool) {
        self.inner.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Answer every non-ping request through `responder`
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.set_responder(responder);
        self
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        *self.inner.responder.lock().expect("mock responder poisoned") = Some(Arc::new(responder));
    }

    pub fn clear_responder(&self) {
        *self.inner.responder.lock().expect("mock responder poisoned") = None;
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of `connect` calls, successful or not
    pub fn connect_attempts(&self) -> usize {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of links opened so far
    pub fn connection_count(&self) -> usize {
        self.inner.links.lock().expect("mock links poisoned").len()
    }

    pub fn link(&self, index: usize) -> Option<MockLink> {
        self.inner.links.lock().expect("mock links poisoned").get(index).cloned()
    }

    pub fn latest(&self) -> Option<MockLink> {
        self.inner.links.lock().expect("mock links poisoned").last().cloned()
    }

    /// Wait until at least `count` links were opened and return the newest
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> Option<MockLink> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.connection_count() >= count {
                return self.latest();
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .inner
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            debug!(url, "Mock connect failing on request");
            return Err(TransportError::ConnectFailed {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut links = self.inner.links.lock().expect("mock links poisoned");
        let link = MockLink {
            inner: Arc::new(LinkState {
                index: links.len(),
                events: events_tx,
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        };
        links.push(link.clone());

        let sink = MockSink {
            link,
            connector: Arc::clone(&self.inner),
        };
        Ok(TransportConnection::new(Arc::new(sink), events_rx))
    }
}

// ----------------------------------------------------------------------------
// Mock Link
// ----------------------------------------------------------------------------

/// Server side of one mock connection
#[derive(Clone)]
pub struct MockLink {
    inner: Arc<LinkState>,
}

struct LinkState {
    index: usize,
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockLink {
    /// Position of this link in connection order
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Deliver a JSON message to the client
    pub fn push(&self, value: Value) -> bool {
        self.push_raw(&value.to_string())
    }

    /// Deliver raw text to the client
    pub fn push_raw(&self, text: &str) -> bool {
        self.inner
            .events
            .send(TransportEvent::Message(text.to_string()))
            .is_ok()
    }

    /// Close the link from the server side
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let _ = self
                .inner
                .events
                .send(TransportEvent::Closed(Some("closed by server".to_string())));
        }
    }

    /// Fail the link with a transport error
    pub fn fail(&self, reason: &str) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inner.events.send(TransportEvent::Error(TransportError::ReceiveFailed {
                reason: reason.to_string(),
            }));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Every frame the client wrote, parsed as JSON
    pub fn sent(&self) -> Vec<Value> {
        self.inner
            .sent
            .lock()
            .expect("mock sent log poisoned")
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Outbound frames whose `command` equals `command`
    pub fn sent_commands(&self, command: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|v| v.get("command").and_then(Value::as_str) == Some(command))
            .collect()
    }

    /// Wait for an outbound frame matching `predicate`
    pub async fn wait_for_sent<F>(&self, predicate: F, timeout: Duration) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.sent().into_iter().find(|v| predicate(v)) {
                return Some(found);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    fn record(&self, text: &str) {
        self.inner.sent.lock().expect("mock sent log poisoned").push(text.to_string());
    }
}

// ----------------------------------------------------------------------------
// Mock Sink
// ----------------------------------------------------------------------------

struct MockSink {
    link: MockLink,
    connector: Arc<MockState>,
}

impl MockSink {
    fn reply_for(&self, request: &Value) -> Option<Value> {
        if request.get("id").and_then(Value::as_str) == Some(PING_ID) {
            return self
                .connector
                .auto_pong
                .load(Ordering::SeqCst)
                .then(|| json!({"type": "response", "id": PING_ID, "status": "success", "result": {}}));
        }

        let responder = self.connector.responder.lock().expect("mock responder poisoned").clone();
        responder.and_then(|respond| respond(request))
    }
}

#[async_trait::async_trait]
impl TransportSink for MockSink {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if self.link.is_closed() {
            return Err(TransportError::Closed);
        }
        self.link.record(&text);

        if let Ok(request) = serde_json::from_str::<Value>(&text) {
            if let Some(reply) = self.reply_for(&request) {
                self.link.push(reply);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.link.inner.closed.swap(true, Ordering::SeqCst) {
            let _ = self
                .link
                .inner
                .events
                .send(TransportEvent::Closed(Some("closed by client".to_string())));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_and_replies() {
        let connector = MockConnector::new()
            .with_auto_pong(true)
            .with_responder(|req| Some(json!({"type": "response", "id": req["id"], "result": {}})));

        let mut conn = connector.connect("ws://mock").await.unwrap();
        conn.sink.send(json!({"command": "ping", "id": "ping"}).to_string()).await.unwrap();
        conn.sink.send(json!({"command": "fee", "id": "a"}).to_string()).await.unwrap();

        let link = connector.latest().unwrap();
        assert_eq!(link.sent().len(), 2);
        assert_eq!(link.sent_commands("fee").len(), 1);

        match conn.events.recv().await.unwrap() {
            TransportEvent::Message(text) => assert!(text.contains("\"ping\"")),
            other => panic!("unexpected event: {:?}", other),
        }
        match conn.events.recv().await.unwrap() {
            TransportEvent::Message(text) => assert!(text.contains("\"a\"")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let connector = MockConnector::new();
        connector.fail_next_connects(2);

        assert!(connector.connect("ws://mock").await.is_err());
        assert!(connector.connect("ws://mock").await.is_err());
        tokio_test::assert_ok!(connector.connect("ws://mock").await);
        assert_eq!(connector.connect_attempts(), 3);
        assert_eq!(connector.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_link_rejects_sends() {
        let connector = MockConnector::new();
        let mut conn = connector.connect("ws://mock").await.unwrap();

        conn.sink.close().await.unwrap();
        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Closed(_))));
        assert!(matches!(
            conn.sink.send("{}".to_string()).await,
            Err(TransportError::Closed)
        ));
    }
}
