//! Registry of open device connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

/// State of a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected but the device has not announced itself yet.
    Connected,
    /// The device announced its name.
    Identified,
    /// The connection has ended.
    Closed,
}

impl SessionState {
    /// Check if the session can still receive frames.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connected | Self::Identified)
    }
}

/// An open device connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: Uuid,
    peer: SocketAddr,
    name: Option<String>,
    process: Option<String>,
    state: SessionState,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Create an unidentified connection for `peer`.
    #[must_use]
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            name: None,
            process: None,
            state: SessionState::Connected,
            connected_at: Utc::now(),
        }
    }

    /// Unique connection id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Device name, once announced.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Process name, once announced.
    #[must_use]
    pub fn process(&self) -> Option<&str> {
        self.process.as_deref()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// When the connection was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Check if the device has announced itself.
    #[must_use]
    pub const fn is_identified(&self) -> bool {
        matches!(self.state, SessionState::Identified)
    }

    /// Record the announced identity.
    ///
    /// A later announcement overwrites the earlier one.
    pub fn identify(&mut self, name: impl Into<String>, process: Option<String>) {
        self.name = Some(name.into());
        self.process = process;
        self.state = SessionState::Identified;
    }

    /// Mark the connection as ended.
    pub const fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Concurrent set of open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` unless `max` connections are already open.
    ///
    /// The connection stays registered until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::TooManyConnections`] if the registry is full.
    pub fn try_register(
        self: &Arc<Self>,
        connection: Connection,
        max: usize,
    ) -> ServerResult<ConnectionGuard> {
        let id = connection.id();
        {
            let mut connections = self.connections.write();
            if connections.len() >= max {
                return Err(ServerError::TooManyConnections(max));
            }
            connections.insert(id, connection);
        }
        Ok(ConnectionGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    /// Remove a connection. Returns the removed entry, if it was present.
    pub fn unregister(&self, id: Uuid) -> Option<Connection> {
        self.connections.write().remove(&id).map(|mut conn| {
            conn.close();
            conn
        })
    }

    /// Record the identity announced on connection `id`.
    ///
    /// Returns false if the connection is no longer registered.
    pub fn set_identity(&self, id: Uuid, name: &str, process: Option<&str>) -> bool {
        self.connections.write().get_mut(&id).is_some_and(|conn| {
            conn.identify(name, process.map(str::to_string));
            true
        })
    }

    /// Look up a connection.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Connection> {
        self.connections.read().get(&id).cloned()
    }

    /// Number of open connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Check if no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Number of connections whose device has announced itself.
    #[must_use]
    pub fn identified_count(&self) -> usize {
        self.connections
            .read()
            .values()
            .filter(|conn| conn.is_identified())
            .count()
    }

    /// Copy of every open connection, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Connection> {
        let mut connections: Vec<_> = self.connections.read().values().cloned().collect();
        connections.sort_by_key(Connection::connected_at);
        connections
    }
}

/// Keeps a connection registered for as long as it lives.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: Uuid,
}

impl ConnectionGuard {
    /// Id of the guarded connection.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
