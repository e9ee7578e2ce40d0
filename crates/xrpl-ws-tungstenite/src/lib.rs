//! WebSocket Transport
//!
//! [`WebSocketConnector`] implements the core `Connector` trait on top of
//! tokio-tungstenite. Each connection is split into a locked write half,
//! used as the transport sink, and a reader task that turns incoming frames
//! into `TransportEvent`s. Control frames (ping/pong) are answered by
//! tungstenite itself and never surface.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use xrpl_ws_core::{Connector, TransportConnection, TransportError, TransportEvent, TransportSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Opens `ws://` and `wss://` connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        debug!(url, "Opening WebSocket");
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!(url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = stream.split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_frames(read, events_tx));

        let sink = WebSocketSink {
            write: Mutex::new(write),
            closed: AtomicBool::new(false),
            reader,
        };
        Ok(TransportConnection::new(Arc::new(sink), events_rx))
    }
}

// ----------------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------------

struct WebSocketSink {
    write: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
    reader: JoinHandle<()>,
}

#[async_trait::async_trait]
impl TransportSink for WebSocketSink {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.write
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
                other => TransportError::SendFailed {
                    reason: other.to_string(),
                },
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.write.lock().await.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::CloseFailed { reason: e.to_string() }),
        }
    }
}

impl Drop for WebSocketSink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ----------------------------------------------------------------------------
// Reader Task
// ----------------------------------------------------------------------------

async fn read_frames(mut read: SplitStream<WsStream>, events: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(frame) = read.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => TransportEvent::Message(text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => TransportEvent::Message(text),
                Err(_) => {
                    debug!("Ignoring binary frame that is not UTF-8");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                let _ = events.send(TransportEvent::Closed(reason));
                return;
            }
            Ok(_) => continue,
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                let _ = events.send(TransportEvent::Closed(None));
                return;
            }
            Err(e) => {
                warn!("WebSocket read failed: {}", e);
                let _ = events.send(TransportEvent::Error(TransportError::ReceiveFailed {
                    reason: e.to_string(),
                }));
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }

    let _ = events.send(TransportEvent::Closed(None));
}
