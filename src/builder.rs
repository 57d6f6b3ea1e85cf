//! Fluent builder for Server construction.
//!
//! Provides a builder pattern interface for creating and configuring Server instances.

use crate::config::ServerConfig;
use crate::server::Server;

use std::time::Duration;

/// Builder for constructing [`Server`] instances with a fluent API.
///
/// # Example
/// ```ignore
/// let server = ServerBuilder::new().backlog(16).lifecycle_events(true).build();
/// server.start_with_config()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Creates a builder holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address and port used by `Server::start_with_config`.
    pub fn bind(mut self, address: impl Into<String>, port: u16) -> Self {
        self.config.address = address.into();
        self.config.port = port;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Sets the size of each read syscall. Zero is raised to one byte.
    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes.max(1);
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn max_events(mut self, events: usize) -> Self {
        self.config.max_events = events.max(1);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    pub fn send_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.send_retry_backoff = backoff;
        self
    }

    /// Caps outbound bytes per connection; `None` removes the cap.
    pub fn max_outbound_bytes(mut self, limit: Option<usize>) -> Self {
        self.config.max_outbound_bytes = limit;
        self
    }

    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.config.reuse_address = enabled;
        self
    }

    pub fn socket_buffer_scale(mut self, scale: u32) -> Self {
        self.config.socket_buffer_scale = scale;
        self
    }

    /// Publishes `Connected` and `Closed` events alongside data.
    pub fn lifecycle_events(mut self, enabled: bool) -> Self {
        self.config.lifecycle_events = enabled;
        self
    }

    /// Returns the configuration built so far.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds and returns a configured, not yet started, Server.
    ///
    /// # Returns
    /// A newly constructed Server in the stopped state
    pub fn build(self) -> Server {
        Server::new(self.config)
    }
}
