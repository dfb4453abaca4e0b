//! Test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use devlog_server::{LogHub, LogServer, ServerConfig};
use devlog_store::{MemoryRecordStore, SharedRecordStore};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

/// Default test timeout.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Config bound to an OS-assigned localhost port.
pub fn local_config() -> ServerConfig {
    ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
}

/// Test server that manages its own lifecycle.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: LogServer,
    pub hub: Arc<LogHub>,
}

impl TestServer {
    /// Start a server backed by an in-memory store.
    pub async fn start() -> Self {
        Self::start_with(local_config(), Arc::new(MemoryRecordStore::new())).await
    }

    /// Start a server with a custom config and store.
    pub async fn start_with(config: ServerConfig, store: SharedRecordStore) -> Self {
        let hub = Arc::new(LogHub::new(store).expect("hub should open the store"));
        let server = LogServer::new(config, Arc::clone(&hub));
        let addr = server.start().await.expect("server should start");
        Self { addr, server, hub }
    }

    /// WebSocket URL devices connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.server.config().ws_path)
    }

    /// Stop the server.
    pub async fn shutdown(self) {
        let _ = timeout(TEST_TIMEOUT, self.server.stop()).await;
    }
}

/// A device streaming logs to the server.
pub struct TestDevice {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub greeting: String,
}

impl TestDevice {
    /// Connect and read the greeting.
    pub async fn connect(url: &str) -> Result<Self, String> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| format!("Failed to connect: {e}"))?;

        let greeting = match timeout(TEST_TIMEOUT, ws.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => text,
            other => return Err(format!("Expected greeting, got {other:?}")),
        };
        Ok(Self { ws, greeting })
    }

    /// Connect and announce `name` / `process`.
    pub async fn connect_as(url: &str, name: &str, process: Option<&str>) -> Result<Self, String> {
        let mut device = Self::connect(url).await?;
        device.announce(name, process).await?;
        Ok(device)
    }

    /// Send raw text.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), String> {
        self.ws
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| format!("Failed to send: {e}"))
    }

    /// Send a `DEVICE_INFO` frame.
    pub async fn announce(&mut self, name: &str, process: Option<&str>) -> Result<(), String> {
        let mut frame = json!({ "TYPE": "DEVICE_INFO", "NAME": name });
        if let Some(process) = process {
            frame["PROCESS"] = json!(process);
        }
        self.send_text(frame.to_string()).await
    }

    /// Send a log event.
    pub async fn log(&mut self, level: i64, tag: &str, message: &str) -> Result<(), String> {
        let frame = json!({
            "logLevel": level,
            "tag": tag,
            "timeMills": 1_700_000_000_000_i64,
            "message": message,
        });
        self.send_text(frame.to_string()).await
    }

    /// Wait for the server to end the connection.
    pub async fn closed_by_server(&mut self) -> bool {
        loop {
            match timeout(TEST_TIMEOUT, self.ws.next()).await {
                Ok(Some(Ok(WsMessage::Close(_))) | None | Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => {}
                Err(_) => return false,
            }
        }
    }

    /// Close the connection.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll `condition` until it holds or the test timeout elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
