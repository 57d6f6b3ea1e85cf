//! Handle-to-connection map.
//!
//! The registry is the only owner that decides a connection's lifetime: the
//! event loop inserts on accept and removes on EOF, in lockstep with the
//! poller's watch set. Workers only look entries up.
//!
//! The map lock is held for the map operation alone and released before any
//! caller touches a connection lock.

use crate::error::RegistryError;
use crate::message::ConnectionHandle;
use crate::net::socket::Socket;
use crate::reactor::io::Connection;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Authoritative map from [`ConnectionHandle`] to [`Connection`].
#[derive(Debug, Default)]
pub struct ClientRegistry {
    connections: RwLock<HashMap<ConnectionHandle, Arc<Connection>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted socket under `handle`.
    ///
    /// # Returns
    /// The new connection, or [`RegistryError::Duplicate`] if `handle` is
    /// still registered. The socket is dropped in that case.
    pub fn create(
        &self,
        handle: ConnectionHandle,
        socket: Socket,
    ) -> Result<Arc<Connection>, RegistryError> {
        let mut connections = self.connections.write();

        if connections.contains_key(&handle) {
            return Err(RegistryError::Duplicate(handle));
        }

        let connection = Arc::new(Connection::new(handle, socket));
        connections.insert(handle, connection.clone());

        Ok(connection)
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<Arc<Connection>> {
        self.connections.read().get(&handle).cloned()
    }

    /// Removes `handle`. Removing an absent handle is a no-op.
    pub fn remove(&self, handle: ConnectionHandle) -> Option<Arc<Connection>> {
        self.connections.write().remove(&handle)
    }

    /// Removes every entry.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.connections
            .write()
            .drain()
            .map(|(_, connection)| connection)
            .collect()
    }

    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.connections.read().contains_key(&handle)
    }

    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
