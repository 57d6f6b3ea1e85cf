//! Event-driven TCP connection server with decoupled send and receive work.
//!
//! One thread polls the OS readiness mechanism (epoll or kqueue) for the
//! listening socket and every accepted connection. Reads and writes happen
//! on two background workers, so neither the poll loop nor the application
//! ever blocks on a socket. The layer moves raw bytes only; any framing is up
//! to the application.
//!
//! # Architecture
//!
//! - **Server**: facade owning the lifecycle, the registry and the queues
//! - **EventLoop**: polls with a bounded timeout; accepts, dispatches and cleans up
//! - **ReceiveWorker**: drains readable connections into [`Message`]s
//! - **SendWorker**: flushes per-connection outbound queues, FIFO per connection
//! - **ClientRegistry**: handle-to-connection map, mutated only by the event loop
//!
//! # Example
//! ```ignore
//! let server = iosock::Server::builder().build();
//! server.start("127.0.0.1", 0, 5)?;
//!
//! while let Some(message) = server.receive() {
//!     server.send(message.handle, message.payload);
//! }
//! ```

mod builder;
mod config;
mod error;
mod message;
pub mod net;
pub mod reactor;
mod runtime;
mod server;

pub use builder::ServerBuilder;
pub use config::{
    DEFAULT_BACKLOG, DEFAULT_MAX_OUTBOUND_BYTES, DEFAULT_READ_CHUNK_SIZE, ServerConfig,
};
pub use error::{Error, RegistryError, SendError};
pub use message::{ConnectionHandle, Message, ServerEvent};
pub use net::socket::Socket;
pub use reactor::io::Connection;
pub use reactor::registry::ClientRegistry;
pub use runtime::driver::LoopState;
pub use server::Server;
