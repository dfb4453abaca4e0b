//! Server and storage configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use devlog_store::{FileRecordStore, MemoryRecordStore, SharedRecordStore};

/// Default WebSocket route devices connect to.
pub const DEFAULT_WS_PATH: &str = "/log/";

/// Default maximum inbound frame size: 64KB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default maximum number of concurrent device connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Configuration for the ingestion server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to.
    pub bind_addr: SocketAddr,
    /// Route accepted during the WebSocket handshake.
    pub ws_path: String,
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
    /// Frames larger than this are dropped.
    pub max_message_size: usize,
    /// Whether a newly identified device becomes the selected user and process.
    pub auto_select_identity: bool,
}

impl ServerConfig {
    /// Create a new server configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ws_path: DEFAULT_WS_PATH.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            auto_select_identity: true,
        }
    }

    /// Set the WebSocket route.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Enable or disable pre-selection of newly identified devices.
    #[must_use]
    pub const fn with_auto_select_identity(mut self, enabled: bool) -> Self {
        self.auto_select_identity = enabled;
        self
    }

    /// Check if a frame size is within the allowed limit.
    #[must_use]
    pub const fn is_message_size_valid(&self, size: usize) -> bool {
        size <= self.max_message_size
    }

    /// Check whether a request path addresses the configured route.
    ///
    /// Trailing slashes are ignored on both sides.
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        let normalize = |p: &str| p.trim_end_matches('/').to_string();
        normalize(path) == normalize(&self.ws_path)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(([0, 0, 0, 0], 8080).into())
    }
}

/// Where log records are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreConfig {
    /// Records live only for the lifetime of the process.
    #[default]
    Memory,
    /// Records are appended to a JSON-lines file.
    File(PathBuf),
}

impl StoreConfig {
    /// Build the configured store.
    ///
    /// The backing file is not touched until the schema is created.
    #[must_use]
    pub fn build(&self) -> SharedRecordStore {
        match self {
            Self::Memory => Arc::new(MemoryRecordStore::new()),
            Self::File(path) => Arc::new(FileRecordStore::new(path.clone())),
        }
    }
}
