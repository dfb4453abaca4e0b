//! WebSocket ingestion server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::hub::LogHub;
use crate::registry::{Connection, ConnectionGuard, ConnectionRegistry};
use crate::session::{run_session, SessionHandler};

/// How long `stop` waits for open sessions to close before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Listener status shown to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not listening.
    Disconnected,
    /// Binding the listener.
    Connecting,
    /// Accepting connections on this address.
    Listening(SocketAddr),
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Listening(addr) => write!(f, "Listening at {addr}"),
        }
    }
}

/// A started accept loop.
#[derive(Debug)]
struct RunningServer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Ingestion server accepting device connections.
///
/// The server can be started and stopped repeatedly. The hub and the
/// connection registry outlive each run.
#[derive(Debug)]
pub struct LogServer {
    config: Arc<ServerConfig>,
    hub: Arc<LogHub>,
    registry: Arc<ConnectionRegistry>,
    status: watch::Sender<ConnectionStatus>,
    running: Mutex<Option<RunningServer>>,
}

impl LogServer {
    /// Create a stopped server feeding `hub`.
    #[must_use]
    pub fn new(config: ServerConfig, hub: Arc<LogHub>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config: Arc::new(config),
            hub,
            registry: Arc::new(ConnectionRegistry::new()),
            status,
            running: Mutex::new(None),
        }
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared ingestion state.
    #[must_use]
    pub const fn hub(&self) -> &Arc<LogHub> {
        &self.hub
    }

    /// Get the registry of open connections.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of open device connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Current listener status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribe to listener status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Address the listener is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Check if the accept loop is running.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 is requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if the server is running, or
    /// [`ServerError::BindFailed`] if the address cannot be bound.
    pub async fn start(&self) -> ServerResult<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                return Err(ServerError::AlreadyRunning(current.local_addr));
            }
        }

        self.status.send_replace(ConnectionStatus::Connecting);
        let addr = self.config.bind_addr;
        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.status.send_replace(ConnectionStatus::Disconnected);
                return Err(ServerError::BindFailed(addr, e));
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.config),
            Arc::clone(&self.hub),
            Arc::clone(&self.registry),
            cancel.clone(),
        ));

        info!(addr = %local_addr, path = %self.config.ws_path, "Log server listening");
        self.status.send_replace(ConnectionStatus::Listening(local_addr));
        *running = Some(RunningServer {
            cancel,
            task,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Close the listener and cancel every open session.
    ///
    /// Returns false if the server was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            return false;
        };

        info!(
            addr = %running.local_addr,
            open = self.registry.snapshot().len(),
            "Stopping log server"
        );
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        self.status.send_replace(ConnectionStatus::Disconnected);
        info!("Log server stopped");
        true
    }
}

/// Accept connections until `cancel` fires, then wind down the sessions.
async fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    hub: Arc<LogHub>,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let guard = match registry
                        .try_register(Connection::new(peer), config.max_connections)
                    {
                        Ok(guard) => guard,
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "Connection rejected");
                            continue;
                        }
                    };
                    debug!(peer = %peer, session_id = %guard.id(), "New connection");
                    sessions.spawn(handle_connection(
                        stream,
                        peer,
                        guard,
                        Arc::clone(&config),
                        Arc::clone(&hub),
                        Arc::clone(&registry),
                        cancel.child_token(),
                    ));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Session task failed");
                }
            }
        }
    }
    drop(listener);

    let drain = async {
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Session task failed");
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!(remaining = sessions.len(), "Aborting sessions that did not close in time");
        sessions.shutdown().await;
    }
}

/// Run the handshake and the session for one accepted socket.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    config: Arc<ServerConfig>,
    hub: Arc<LogHub>,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
) {
    let session_id = guard.id();
    let route = Arc::clone(&config);
    let check_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if route.matches_path(request.uri().path()) {
            Ok(response)
        } else {
            let mut error = ErrorResponse::new(Some("not found".to_string()));
            *error.status_mut() = StatusCode::NOT_FOUND;
            Err(error)
        }
    };

    let handshake = tokio::select! {
        () = cancel.cancelled() => return,
        ws = accept_hdr_async(stream, check_path) => ws,
    };
    let ws_stream = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, session_id = %session_id, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    info!(peer = %peer, session_id = %session_id, "WebSocket connection established");
    let handler = SessionHandler::new(session_id, hub, registry, config);
    match run_session(ws_stream, handler, cancel).await {
        Ok(()) => debug!(peer = %peer, "Connection closed normally"),
        Err(e) => debug!(peer = %peer, error = %e, "Connection ended with error"),
    }
    drop(guard);
}
