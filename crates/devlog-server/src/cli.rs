//! Command-line argument parsing with clap.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use devlog_server::{
    ServerConfig, StoreConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_WS_PATH,
};
use devlog_store::{FilterCriteria, LevelFilter};

/// devlog - collect logs from devices over WebSocket.
#[derive(Parser, Debug, Clone)]
#[command(name = "devlog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, env = "DEVLOG_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// JSON-lines file holding the stored records.
    #[arg(short, long, env = "DEVLOG_DATA", default_value = "devlog.jsonl")]
    pub data: PathBuf,

    /// Keep records in memory only.
    #[arg(long, conflicts_with = "data")]
    pub in_memory: bool,

    /// WebSocket route devices connect to.
    #[arg(long, env = "DEVLOG_WS_PATH", default_value = DEFAULT_WS_PATH)]
    pub ws_path: String,

    /// Maximum number of concurrent device connections.
    #[arg(long, env = "DEVLOG_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Frames larger than this many bytes are dropped.
    #[arg(long, env = "DEVLOG_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Do not select a device when it announces itself.
    #[arg(long)]
    pub no_auto_select: bool,

    /// Only show records from this device.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Only show records from this process.
    #[arg(short, long)]
    pub process: Option<String>,

    /// Only show records of this level (all, verbose, debug, info, warning, error).
    #[arg(short, long, default_value = "all")]
    pub level: LevelFilter,

    /// Only show records whose tag contains this text.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Do not print records to stdout.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Server settings from the arguments.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.bind)
            .with_ws_path(self.ws_path.clone())
            .with_max_connections(self.max_connections)
            .with_max_message_size(self.max_message_size)
            .with_auto_select_identity(!self.no_auto_select)
    }

    /// Store settings from the arguments.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        if self.in_memory {
            StoreConfig::Memory
        } else {
            StoreConfig::File(self.data.clone())
        }
    }

    /// Initial filter selection from the arguments.
    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            user: self.user.clone(),
            process: self.process.clone(),
            level: self.level,
            search: self.search.clone(),
        }
    }
}
