//! WebSocket test client for protocol testing
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Low-level WebSocket connection
pub struct WsConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl WsConnection {
    /// Connect to WebSocket endpoint
    pub async fn connect(addr: SocketAddr) -> Self {
        let url = format!("ws://{}/ws", addr);
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("Failed to connect");
        let (sink, stream) = ws.split();
        Self { sink, stream }
    }

    /// Send raw text message
    pub async fn send_raw(&mut self, msg: &str) {
        self.sink
            .send(Message::Text(msg.to_string().into()))
            .await
            .unwrap();
    }

    /// Send JSON message
    pub async fn send_json<T: Serialize>(&mut self, msg: &T) {
        let json = serde_json::to_string(msg).unwrap();
        self.send_raw(&json).await;
    }

    /// Receive raw text message
    pub async fn recv_raw(&mut self) -> String {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("WebSocket error: {}", e),
                None => panic!("WebSocket closed"),
            }
        }
    }

    /// Receive the next JSON message, panicking after a timeout
    pub async fn recv_json(&mut self) -> Value {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.recv_raw())
            .await
            .expect("Timed out waiting for message");
        serde_json::from_str(&text).expect("Failed to parse JSON")
    }

    /// Receive with timeout, returns None if timeout
    pub async fn recv_timeout(&mut self, duration: Duration) -> Option<String> {
        tokio::time::timeout(duration, self.recv_raw()).await.ok()
    }
}

/// High-level test client with helper methods
pub struct TestClient {
    pub conn: WsConnection,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            conn: WsConnection::connect(addr).await,
        }
    }

    /// Skip messages until one of the given type arrives
    pub async fn expect(&mut self, message_type: &str) -> Value {
        loop {
            let msg = self.conn.recv_json().await;
            if msg["type"] == message_type {
                return msg;
            }
        }
    }

    /// Skip messages until one of the given type arrives for a session
    pub async fn expect_for(&mut self, message_type: &str, session_id: &str) -> Value {
        loop {
            let msg = self.expect(message_type).await;
            if msg["session_id"] == session_id {
                return msg;
            }
        }
    }

    /// Start monitoring, returns the session ID
    pub async fn start_monitoring(&mut self, session_id: Option<&str>) -> String {
        self.conn
            .send_json(&json!({ "type": "start_monitoring", "session_id": session_id }))
            .await;

        let response = self.conn.recv_json().await;
        assert_eq!(
            response["type"], "monitoring_started",
            "Expected monitoring_started but got: {}",
            response
        );
        response["session_id"].as_str().unwrap().to_string()
    }

    /// Send one detector reading
    pub async fn sample(&mut self, session_id: &str, kind: &str, value: Value) {
        self.conn
            .send_json(&json!({
                "type": "sample",
                "session_id": session_id,
                "kind": kind,
                "value": value,
            }))
            .await;
    }

    /// Send the same reading `n` times
    pub async fn samples(&mut self, session_id: &str, kind: &str, value: Value, n: usize) {
        for _ in 0..n {
            self.sample(session_id, kind, value.clone()).await;
        }
    }

    /// Stop monitoring, returns the monitoring_stopped reply
    pub async fn stop_monitoring(&mut self, session_id: &str) -> Value {
        self.conn
            .send_json(&json!({ "type": "stop_monitoring", "session_id": session_id }))
            .await;
        self.expect("monitoring_stopped").await
    }

    /// Register as an admin dashboard, returns the live sessions
    pub async fn join_admin(&mut self) -> Vec<Value> {
        self.conn.send_json(&json!({ "type": "join_admin" })).await;
        let response = self.expect("admin_joined").await;
        response["sessions"].as_array().cloned().unwrap_or_default()
    }
}
