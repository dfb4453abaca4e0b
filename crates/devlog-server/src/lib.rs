//! # devlog-server
//!
//! WebSocket log ingestion server with a live-filtered log view.
//!
//! Devices connect over WebSocket, announce themselves once and then stream
//! log events. Every event is stored, the identity sets are updated and the
//! current filter is re-run, so observers of [`LogHub`] always see the
//! records matching the selected user, process, level and tag search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────────────────────┐
//! │    device    │◄──────────────────►│  LogServer                   │
//! └──────────────┘                    │   ├─ ConnectionRegistry      │
//! ┌──────────────┐                    │   └─ SessionHandler (each)   │
//! │    device    │◄──────────────────►│            │                 │
//! └──────────────┘                    │            ▼                 │
//!                                     │  LogHub                      │
//!                                     │   ├─ RecordStore             │
//!                                     │   ├─ IdentityTracker         │
//!                                     │   └─ FilterCriteria ─► view  │
//!                                     └──────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use devlog_server::{LogHub, LogServer, ServerConfig};
//! use devlog_store::MemoryRecordStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hub = Arc::new(LogHub::new(Arc::new(MemoryRecordStore::new()))?);
//!     let server = LogServer::new(ServerConfig::default(), Arc::clone(&hub));
//!
//!     let addr = server.start().await?;
//!     println!("listening on ws://{addr}/log/");
//!
//!     hub.set_user(Some("pixel-7".to_string()))?;
//!     for record in hub.logs().iter() {
//!         println!("{record}");
//!     }
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Message Protocol
//!
//! Devices send one JSON object per text frame (see [`protocol`]):
//!
//! - **`DEVICE_INFO`**: the device name and, optionally, its process
//! - **log event**: level, tag, device time and message
//!
//! The server sends a single greeting right after the handshake.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hub;
pub mod identity;
pub mod observable;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

// Re-export main types
pub use config::{
    ServerConfig, StoreConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_WS_PATH,
};
pub use error::{ProtocolError, ServerError, ServerResult};
pub use hub::{LogHub, LogView};
pub use identity::IdentityTracker;
pub use observable::{ListChange, ObservableList};
pub use protocol::{greeting, DeviceInfo, InboundFrame, LogEvent};
pub use registry::{Connection, ConnectionGuard, ConnectionRegistry, SessionState};
pub use server::{ConnectionStatus, LogServer};
pub use session::{run_session, ws_message_size, FrameOutcome, SessionHandler};
