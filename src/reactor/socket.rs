use crate::message::ConnectionHandle;
use crate::net::listener::Listener;
use crate::reactor::io::Connection;
use crate::reactor::poller::{Interest, Poller};
use crate::reactor::registry::ClientRegistry;

use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use tracing::error;

/// Accepts one pending connection, registers it and starts watching it.
///
/// Returns `Ok(None)` when the backlog is empty. On success the registry
/// entry and the poller watch both exist; on failure neither does.
pub(crate) fn accept_client(
    listener: &Listener,
    poller: &Poller,
    registry: &ClientRegistry,
) -> io::Result<Option<Arc<Connection>>> {
    let socket = match listener.accept() {
        Ok(socket) => socket,
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
        Err(err) => return Err(err),
    };

    let file_descriptor = socket.as_raw_fd();
    let handle = ConnectionHandle::from(file_descriptor);

    let connection = match registry.create(handle, socket) {
        Ok(connection) => connection,
        Err(err) => {
            error!(%handle, error = %err, "descriptor reused while still registered");
            return Ok(None);
        }
    };

    if let Err(err) = poller.register(file_descriptor, Interest::CLIENT) {
        registry.remove(handle);
        return Err(err);
    }

    Ok(Some(connection))
}
