//! Per-device WebSocket session.
//!
//! [`SessionHandler`] holds the state machine of one connection and turns
//! each frame into a [`FrameOutcome`]. [`run_session`] drives it from a
//! WebSocket stream until the device disconnects or the server cancels.

use std::sync::Arc;

use devlog_store::RecordId;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ProtocolError, ServerError, ServerResult};
use crate::hub::LogHub;
use crate::protocol::{greeting, DeviceInfo, InboundFrame};
use crate::registry::{ConnectionRegistry, SessionState};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Control or binary frame; nothing to do.
    Ignored,
    /// The device announced itself.
    Identified,
    /// A log event was stored under this id.
    Ingested(RecordId),
    /// The frame was unusable and was discarded.
    Dropped,
    /// The device closed the connection.
    Close,
}

/// Get the size of a WebSocket message in bytes.
#[must_use]
pub fn ws_message_size(ws_msg: &WsMessage) -> usize {
    match ws_msg {
        WsMessage::Text(text) => text.len(),
        WsMessage::Binary(data) | WsMessage::Ping(data) | WsMessage::Pong(data) => data.len(),
        WsMessage::Close(frame) => frame.as_ref().map_or(0, |f| f.reason.len() + 2),
        WsMessage::Frame(frame) => frame.len(),
    }
}

/// State of a single device connection.
#[derive(Debug)]
pub struct SessionHandler {
    id: Uuid,
    hub: Arc<LogHub>,
    registry: Arc<ConnectionRegistry>,
    config: Arc<ServerConfig>,
    state: SessionState,
    name: Option<String>,
    process: Option<String>,
}

impl SessionHandler {
    /// Create a handler for the registered connection `id`.
    #[must_use]
    pub fn new(
        id: Uuid,
        hub: Arc<LogHub>,
        registry: Arc<ConnectionRegistry>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            id,
            hub,
            registry,
            config,
            state: SessionState::Connected,
            name: None,
            process: None,
        }
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Announced device name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Announced process name.
    #[must_use]
    pub fn process(&self) -> Option<&str> {
        self.process.as_deref()
    }

    /// Handle one WebSocket message.
    ///
    /// Protocol and storage failures are logged and reported as
    /// [`FrameOutcome::Dropped`]; they never end the session.
    pub fn handle_message(&mut self, ws_msg: &WsMessage) -> FrameOutcome {
        match ws_msg {
            WsMessage::Text(text) => {
                let size = ws_message_size(ws_msg);
                if !self.config.is_message_size_valid(size) {
                    let err = ProtocolError::TooLarge {
                        size,
                        limit: self.config.max_message_size,
                    };
                    warn!(session_id = %self.id, error = %err, "Dropping frame");
                    return FrameOutcome::Dropped;
                }
                match self.handle_text(text) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(
                            session_id = %self.id,
                            device = self.name.as_deref().unwrap_or("-"),
                            error = %e,
                            "Dropping frame"
                        );
                        FrameOutcome::Dropped
                    }
                }
            }
            WsMessage::Close(_) => {
                debug!(session_id = %self.id, "Received close frame");
                self.state = SessionState::Closed;
                FrameOutcome::Close
            }
            WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
                FrameOutcome::Ignored
            }
        }
    }

    /// Handle the text of one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded, a log event arrives
    /// before the announcement, or the store rejects the record.
    pub fn handle_text(&mut self, text: &str) -> ServerResult<FrameOutcome> {
        match InboundFrame::from_json(text)? {
            InboundFrame::DeviceInfo(info) => {
                self.identify(info);
                Ok(FrameOutcome::Identified)
            }
            InboundFrame::LogEvent(event) => {
                let Some(name) = self.name.as_deref() else {
                    return Err(ProtocolError::NotIdentified.into());
                };
                let record = event.into_record(name, self.process.as_deref().unwrap_or(""))?;
                let stored = self.hub.ingest(record)?;
                Ok(FrameOutcome::Ingested(stored.id))
            }
        }
    }

    fn identify(&mut self, info: DeviceInfo) {
        let DeviceInfo { name, process } = info;
        let process = process.filter(|p| !p.is_empty());

        self.registry.set_identity(self.id, &name, process.as_deref());
        self.hub.identities().add_user(&name);
        if let Some(process) = process.as_deref() {
            self.hub.identities().add_process(process);
        }
        if self.config.auto_select_identity {
            if let Err(e) = self.hub.select_identity(&name, process.as_deref()) {
                warn!(session_id = %self.id, error = %e, "Failed to select announced device");
            }
        }

        info!(
            session_id = %self.id,
            device = %name,
            process = process.as_deref().unwrap_or("-"),
            "Device identified"
        );
        self.name = Some(name);
        self.process = process;
        self.state = SessionState::Identified;
    }
}

/// Run a session handling loop for a WebSocket connection.
///
/// Sends the greeting, then feeds every inbound message to `handler` until
/// the device disconnects, the stream fails, or `cancel` fires.
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent or the stream fails.
pub async fn run_session<S>(
    ws_stream: S,
    mut handler: SessionHandler,
    cancel: CancellationToken,
) -> ServerResult<()>
where
    S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<WsMessage>
        + Unpin
        + Send,
    <S as futures::Sink<WsMessage>>::Error: std::fmt::Display,
{
    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let session_id = handler.id();

    let hello = greeting(handler.registry.count());
    ws_sink
        .send(WsMessage::Text(hello))
        .await
        .map_err(|e| ServerError::WebSocket(e.to_string()))?;

    info!(session_id = %session_id, "Starting session handler");

    let result = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(session_id = %session_id, "Session cancelled");
                let _ = ws_sink.send(WsMessage::Close(None)).await;
                break Ok(());
            }
            next = ws_stream.next() => match next {
                Some(Ok(ws_msg)) => {
                    if handler.handle_message(&ws_msg) == FrameOutcome::Close {
                        break Ok(());
                    }
                }
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "WebSocket read error");
                    break Err(ServerError::from(e));
                }
                None => break Ok(()),
            }
        }
    };

    handler.state = SessionState::Closed;
    info!(
        session_id = %session_id,
        device = handler.name().unwrap_or("-"),
        "Session ended"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Connection;
    use devlog_store::{LevelFilter, MemoryRecordStore, RecordStore};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::WebSocketStream;

    struct Fixture {
        hub: Arc<LogHub>,
        registry: Arc<ConnectionRegistry>,
        handler: SessionHandler,
        _guard: crate::registry::ConnectionGuard,
    }

    fn fixture(config: ServerConfig) -> Fixture {
        let hub = Arc::new(
            LogHub::new(Arc::new(MemoryRecordStore::new())).expect("memory store is reachable"),
        );
        let registry = Arc::new(ConnectionRegistry::new());
        let conn = Connection::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000));
        let id = conn.id();
        let guard = registry.try_register(conn, 10).expect("registry has room");
        let handler = SessionHandler::new(
            id,
            Arc::clone(&hub),
            Arc::clone(&registry),
            Arc::new(config),
        );
        Fixture {
            hub,
            registry,
            handler,
            _guard: guard,
        }
    }

    fn text(s: &str) -> WsMessage {
        WsMessage::Text(s.to_string())
    }

    const ANNOUNCE: &str = r#"{"TYPE":"DEVICE_INFO","NAME":"dev1","PROCESS":"app"}"#;
    const EVENT: &str = r#"{"logLevel":4,"tag":"net","timeMills":1000,"message":"hello"}"#;

    // ==================== ws_message_size Tests ====================

    #[test]
    fn test_ws_message_size_text() {
        assert_eq!(ws_message_size(&text("hello world")), 11);
    }

    #[test]
    fn test_ws_message_size_binary() {
        assert_eq!(ws_message_size(&WsMessage::Binary(vec![1, 2, 3])), 3);
    }

    #[test]
    fn test_ws_message_size_close_empty() {
        assert_eq!(ws_message_size(&WsMessage::Close(None)), 0);
    }

    // ==================== Frame handling Tests ====================

    #[test]
    fn test_log_before_announcement_is_dropped() {
        let mut fx = fixture(ServerConfig::default());
        assert_eq!(fx.handler.handle_message(&text(EVENT)), FrameOutcome::Dropped);
        assert_eq!(fx.handler.state(), SessionState::Connected);
        assert!(fx.hub.logs().is_empty());
    }

    #[test]
    fn test_announcement_identifies_session() {
        let mut fx = fixture(ServerConfig::default());
        assert_eq!(fx.handler.handle_message(&text(ANNOUNCE)), FrameOutcome::Identified);

        assert_eq!(fx.handler.state(), SessionState::Identified);
        assert_eq!(fx.handler.name(), Some("dev1"));
        assert_eq!(fx.handler.process(), Some("app"));
        assert_eq!(fx.registry.identified_count(), 1);
        assert_eq!(fx.hub.users().snapshot(), vec!["dev1"]);
        assert_eq!(fx.hub.processes().snapshot(), vec!["app"]);
    }

    #[test]
    fn test_repeated_announcement_is_idempotent() {
        let mut fx = fixture(ServerConfig::default());
        fx.handler.handle_message(&text(ANNOUNCE));
        fx.handler.handle_message(&text(ANNOUNCE));

        assert_eq!(fx.hub.users().len(), 1);
        assert_eq!(fx.hub.processes().len(), 1);
    }

    #[test]
    fn test_announcement_selects_device() {
        let mut fx = fixture(ServerConfig::default());
        fx.handler.handle_message(&text(ANNOUNCE));

        let criteria = fx.hub.criteria();
        assert_eq!(criteria.user.as_deref(), Some("dev1"));
        assert_eq!(criteria.process.as_deref(), Some("app"));
    }

    #[test]
    fn test_auto_select_can_be_disabled() {
        let mut fx = fixture(ServerConfig::default().with_auto_select_identity(false));
        fx.handler.handle_message(&text(ANNOUNCE));

        assert!(fx.hub.criteria().is_neutral());
    }

    #[test]
    fn test_log_event_is_ingested() {
        let mut fx = fixture(ServerConfig::default());
        fx.handler.handle_message(&text(ANNOUNCE));
        let outcome = fx.handler.handle_message(&text(EVENT));

        assert!(matches!(outcome, FrameOutcome::Ingested(_)));
        let logs = fx.hub.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_id, "dev1");
        assert_eq!(logs[0].process_name, "app");
        assert_eq!(logs[0].message, "hello");
        assert!(fx.hub.tags().contains("net"));
    }

    #[test]
    fn test_announcement_without_process() {
        let mut fx = fixture(ServerConfig::default());
        fx.handler
            .handle_message(&text(r#"{"TYPE":"DEVICE_INFO","NAME":"dev2"}"#));
        let outcome = fx.handler.handle_message(&text(EVENT));

        assert!(matches!(outcome, FrameOutcome::Ingested(_)));
        assert!(fx.hub.processes().is_empty());
        assert_eq!(fx.hub.logs()[0].process_name, "");
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let mut fx = fixture(ServerConfig::default());
        fx.handler.handle_message(&text(ANNOUNCE));

        for frame in [
            "garbage",
            r#"{"TYPE":"PING"}"#,
            r#"{"logLevel":9,"tag":"t","timeMills":1,"message":"m"}"#,
            r#"{"logLevel":4,"timeMills":1,"message":"m"}"#,
        ] {
            assert_eq!(fx.handler.handle_message(&text(frame)), FrameOutcome::Dropped);
        }
        assert_eq!(fx.handler.state(), SessionState::Identified);
        assert!(fx.hub.logs().is_empty());
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut fx = fixture(ServerConfig::default().with_max_message_size(16));
        assert_eq!(fx.handler.handle_message(&text(ANNOUNCE)), FrameOutcome::Dropped);
        assert!(fx.hub.users().is_empty());
    }

    #[test]
    fn test_control_frames_are_ignored() {
        let mut fx = fixture(ServerConfig::default());
        assert_eq!(
            fx.handler.handle_message(&WsMessage::Binary(b"{}".to_vec())),
            FrameOutcome::Ignored
        );
        assert_eq!(
            fx.handler.handle_message(&WsMessage::Ping(Vec::new())),
            FrameOutcome::Ignored
        );
        assert_eq!(fx.handler.handle_message(&WsMessage::Close(None)), FrameOutcome::Close);
        assert_eq!(fx.handler.state(), SessionState::Closed);
    }

    #[test]
    fn test_level_filter_applies_to_ingested_frames() {
        let mut fx = fixture(ServerConfig::default());
        fx.handler.handle_message(&text(ANNOUNCE));
        assert!(fx.hub.set_level(LevelFilter::Exact(devlog_store::LogLevel::Error)).is_ok());

        fx.handler.handle_message(&text(EVENT));
        assert!(fx.hub.logs().is_empty());
        assert_eq!(fx.hub.store().len().unwrap_or(0), 1);
    }

    // ==================== run_session Tests ====================

    #[tokio::test]
    async fn test_run_session_greets_and_ingests() {
        let fx = fixture(ServerConfig::default());
        let hub = Arc::clone(&fx.hub);
        let (client_io, server_io) = tokio::io::duplex(4096);

        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(server_ws, fx.handler, cancel.clone()));

        let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let hello = client.next().await;
        assert!(matches!(
            hello,
            Some(Ok(WsMessage::Text(ref t))) if t == "You are connected! There are 1 users here."
        ));

        assert!(client.send(text(ANNOUNCE)).await.is_ok());
        assert!(client.send(text("not json")).await.is_ok());
        assert!(client.send(text(EVENT)).await.is_ok());
        assert!(client.send(WsMessage::Close(None)).await.is_ok());

        let result = task.await;
        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(hub.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_run_session_stops_on_cancel() {
        let fx = fixture(ServerConfig::default());
        let (client_io, server_io) = tokio::io::duplex(4096);

        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(server_ws, fx.handler, cancel.clone()));

        let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let _ = client.next().await;

        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
