//! Error types for the ingestion server.

use std::net::SocketAddr;

use devlog_store::StoreError;
use thiserror::Error;

/// Errors raised while decoding a single inbound frame.
///
/// None of these close the connection; the offending frame is dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or lacks a required field.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame carries a `TYPE` marker this server does not understand.
    #[error("unknown frame type: {0}")]
    UnknownType(String),

    /// A field is present but its value is unusable.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Wire name of the field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A log event arrived before the device announced itself.
    #[error("log event received before DEVICE_INFO")]
    NotIdentified,

    /// The frame exceeds the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the received frame
        size: usize,
        /// Configured limit
        limit: usize,
    },
}

/// Errors that can occur in the ingestion server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// `start` was called while the server is already running.
    #[error("server is already running on {0}")]
    AlreadyRunning(SocketAddr),

    /// WebSocket error occurred.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The record store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The connection limit has been reached.
    #[error("connection limit of {0} reached")]
    TooManyConnections(usize),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionClosed,
            other => Self::WebSocket(other.to_string()),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_bind_failed_error_display() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = ServerError::BindFailed(addr, io_err);

        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:8080"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn test_already_running_display() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        let err = ServerError::AlreadyRunning(addr);
        assert_eq!(err.to_string(), "server is already running on 127.0.0.1:9000");
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let err: ServerError = ProtocolError::NotIdentified.into();
        assert_eq!(err.to_string(), "log event received before DEVICE_INFO");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").err();
        let err = json_err.map(ProtocolError::from);
        assert!(matches!(err, Some(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: ServerError = StoreError::SchemaMissing.into();
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn test_closed_websocket_maps_to_connection_closed() {
        let err: ServerError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, ServerError::ConnectionClosed));
    }

    #[test]
    fn test_too_large_display() {
        let err = ProtocolError::TooLarge { size: 10, limit: 4 };
        assert_eq!(err.to_string(), "frame of 10 bytes exceeds limit of 4 bytes");
    }
}
