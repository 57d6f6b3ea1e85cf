//! Error types.
//!
//! [`Error`] covers listener-level and lifecycle failures, the only ones the
//! application sees as control flow. Per-connection trouble is logged and
//! never leaves the connection it happened on, except through the
//! [`SendError`] returned by `Server::try_send`.

use crate::message::ConnectionHandle;

use std::io;
use thiserror::Error;

/// Server lifecycle and listener errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be created, bound or put in listen mode.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The bind address did not resolve.
    #[error("invalid bind address {0}")]
    InvalidAddress(String),

    /// The readiness poller failed; the event loop stopped.
    #[error("poller failure: {0}")]
    Poller(#[source] io::Error),

    /// `start` was called while the server was not stopped.
    #[error("server is already running")]
    AlreadyRunning,

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    /// A server thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Reasons why `Server::try_send` did not queue data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// No live connection has this handle.
    #[error("no connection for handle {0}")]
    UnknownHandle(ConnectionHandle),

    /// The connection already failed a write; its queue was discarded.
    #[error("connection {0} is closing")]
    Closed(ConnectionHandle),

    /// Queuing the data would exceed the per-connection outbound limit. The
    /// connection is shut down.
    #[error("outbound limit of {limit} bytes exceeded for {handle}")]
    OutboundLimit {
        handle: ConnectionHandle,
        limit: usize,
    },

    /// Nothing to send.
    #[error("empty payload")]
    Empty,
}

/// Registry bookkeeping errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handle was registered twice, which means a descriptor was reused
    /// while its previous connection was still tracked.
    #[error("handle {0} is already registered")]
    Duplicate(ConnectionHandle),
}
