//! Values exchanged with the embedding application.

use std::fmt;
use std::net::SocketAddr;
use std::os::fd::RawFd;

/// Opaque identifier of one accepted connection.
///
/// Wraps the connection's socket descriptor. The OS may hand the same number
/// to a later connection once this one is fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(RawFd);

impl ConnectionHandle {
    /// The underlying descriptor number.
    pub fn as_raw(&self) -> RawFd {
        self.0
    }
}

impl From<RawFd> for ConnectionHandle {
    fn from(file_descriptor: RawFd) -> Self {
        Self(file_descriptor)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bytes read from one connection in a single drain.
///
/// There is no framing: a payload may hold part of what the peer sent, or
/// several of its writes glued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub handle: ConnectionHandle,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(handle: ConnectionHandle, payload: Vec<u8>) -> Self {
        Self { handle, payload }
    }
}

/// Everything the server publishes on its inbound queue.
///
/// `Connected` and `Closed` are only published when lifecycle events are
/// enabled in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A connection was accepted and registered.
    Connected {
        handle: ConnectionHandle,
        peer: Option<SocketAddr>,
    },
    /// Bytes arrived on a connection.
    Data(Message),
    /// A connection was torn down; no further data will arrive for it.
    Closed { handle: ConnectionHandle },
}

impl ServerEvent {
    pub fn handle(&self) -> ConnectionHandle {
        match self {
            ServerEvent::Connected { handle, .. } => *handle,
            ServerEvent::Data(message) => message.handle,
            ServerEvent::Closed { handle } => *handle,
        }
    }
}
