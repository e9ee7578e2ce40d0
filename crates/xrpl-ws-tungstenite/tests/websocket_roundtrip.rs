//! WebSocket transport against a local tungstenite server

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

use xrpl_ws_core::{Connector, TransportError, TransportEvent};
use xrpl_ws_runtime::{ClientBuilder, ClientConfig, ConnectionState};
use xrpl_ws_tungstenite::WebSocketConnector;

const WAIT: Duration = Duration::from_secs(5);

/// Minimal rippled stand-in: answers every request with a response carrying
/// the same id, and closes after `close_after` requests if set
async fn spawn_server(close_after: Option<usize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                let mut handled = 0;
                while let Some(Ok(frame)) = ws.next().await {
                    let text = match frame {
                        Message::Text(text) => text,
                        Message::Close(_) => break,
                        _ => continue,
                    };
                    let request: Value = match serde_json::from_str(&text) {
                        Ok(request) => request,
                        Err(_) => continue,
                    };
                    let reply = json!({
                        "type": "response",
                        "id": request["id"],
                        "status": "success",
                        "result": {"command": request["command"]},
                    });
                    if ws.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }

                    handled += 1;
                    if Some(handled) == close_after {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn test_connector_exchanges_text_frames() {
    let addr = spawn_server(None).await;
    let connector = WebSocketConnector::new();
    let mut connection = connector.connect(&format!("ws://{}", addr)).await.unwrap();

    connection
        .sink
        .send(json!({"command": "server_info", "id": "a"}).to_string())
        .await
        .unwrap();

    match timeout(WAIT, connection.events.recv()).await.unwrap() {
        Some(TransportEvent::Message(text)) => {
            let reply: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(reply["id"], "a");
            assert_eq!(reply["result"]["command"], "server_info");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    tokio_test::assert_ok!(connection.sink.close().await);
    tokio_test::assert_ok!(connection.sink.close().await);
    assert!(matches!(
        connection.sink.send("{}".to_string()).await,
        Err(TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_server_close_is_reported() {
    let addr = spawn_server(Some(1)).await;
    let connector = WebSocketConnector::new();
    let mut connection = connector.connect(&format!("ws://{}", addr)).await.unwrap();

    connection.sink.send(json!({"command": "fee", "id": 1}).to_string()).await.unwrap();

    let mut closed = false;
    while let Ok(Some(event)) = timeout(WAIT, connection.events.recv()).await {
        if let TransportEvent::Closed(_) = event {
            closed = true;
            break;
        }
    }
    assert!(closed);
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = WebSocketConnector::new().connect(&format!("ws://{}", addr)).await;
    assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
}

#[tokio::test]
async fn test_client_round_trip_over_websocket() {
    let addr = spawn_server(None).await;
    let config = ClientConfig::with_server(format!("ws://{}", addr)).with_timeout(Duration::from_secs(2));
    let client = ClientBuilder::new(config)
        .with_connector(WebSocketConnector::new())
        .build()
        .unwrap();

    timeout(WAIT, client.connect(true)).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let response = client.server_info().await.unwrap();
    assert_eq!(response["type"], "response");
    assert_eq!(response["result"]["command"], "server_info");

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
