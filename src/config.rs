//! Server configuration.

use std::time::Duration;

/// Listen backlog used when none is given.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Bytes requested from the kernel per non-blocking read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 10 * 1024;

/// Per-connection cap on bytes waiting to be sent.
pub const DEFAULT_MAX_OUTBOUND_BYTES: usize = 8 * 1024 * 1024;

/// Tunables for a [`Server`](crate::Server).
///
/// Usually built through [`ServerBuilder`](crate::ServerBuilder).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address used by `Server::start_with_config`.
    pub address: String,
    /// Bind port used by `Server::start_with_config`; `0` picks an ephemeral port.
    pub port: u16,
    /// Listen backlog.
    pub backlog: i32,
    /// Size of each individual read syscall.
    pub read_chunk_size: usize,
    /// Upper bound on one poll wait, and so on shutdown latency.
    pub poll_timeout: Duration,
    /// Readiness events fetched per poll.
    pub max_events: usize,
    /// Bounded wait for a connection lock inside the workers.
    pub lock_timeout: Duration,
    /// Pause taken by the send worker once every connection it is flushing
    /// would block.
    pub send_retry_backoff: Duration,
    /// Outbound bytes a connection may hold before it is shut down. `None`
    /// lets queues grow without bound.
    pub max_outbound_bytes: Option<usize>,
    /// Set `SO_REUSEADDR` on the listener.
    pub reuse_address: bool,
    /// Multiplier applied to the kernel's default socket buffer sizes.
    pub socket_buffer_scale: u32,
    /// Publish `Connected` and `Closed` events on the inbound queue.
    pub lifecycle_events: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 0,
            backlog: DEFAULT_BACKLOG,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_timeout: Duration::from_millis(100),
            max_events: 64,
            lock_timeout: Duration::from_millis(10),
            send_retry_backoff: Duration::from_millis(1),
            max_outbound_bytes: Some(DEFAULT_MAX_OUTBOUND_BYTES),
            reuse_address: true,
            socket_buffer_scale: 2,
            lifecycle_events: false,
        }
    }
}
