//! Server facade.
//!
//! The server owns the registry, the queues and the three threads: the event
//! loop, the receive worker and the send worker. The application talks to it
//! through [`Server::send`] and [`Server::receive`] from any number of threads.

use crate::builder::ServerBuilder;
use crate::config::ServerConfig;
use crate::error::{Error, SendError};
use crate::message::{ConnectionHandle, Message, ServerEvent};
use crate::net::listener::{ListenOptions, Listener};
use crate::net::utils::resolve;
use crate::reactor::core::{Reactor, ReactorOptions};
use crate::reactor::registry::ClientRegistry;
use crate::runtime::Queues;
use crate::runtime::driver::{LoopControl, LoopState, run_event_loop};
use crate::runtime::queue::Popped;
use crate::runtime::receive::ReceiveWorker;
use crate::runtime::send::SendWorker;

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct Threads {
    event_loop: JoinHandle<Result<(), Error>>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

/// Event-driven TCP connection server.
///
/// # Example
/// ```ignore
/// let server = Server::new(ServerConfig::default());
/// server.start("127.0.0.1", 0, 5)?;
///
/// while let Some(message) = server.receive() {
///     server.send(message.handle, message.payload);
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    queues: Queues,
    control: Arc<LoopControl>,
    threads: Mutex<Option<Threads>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a stopped server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            queues: Queues::closed(),
            control: Arc::new(LoopControl::new()),
            threads: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds, listens and launches the event loop and both workers.
    ///
    /// # Arguments
    /// * `address` - Host or IP to bind, e.g. `"127.0.0.1"` or `"::1"`
    /// * `port` - Port to bind; `0` picks an ephemeral port
    /// * `backlog` - Listen backlog
    ///
    /// # Errors
    /// [`Error::Bind`] if the address is unavailable, [`Error::AlreadyRunning`]
    /// if the server is not stopped.
    pub fn start(&self, address: &str, port: u16, backlog: i32) -> Result<(), Error> {
        if !self.control.begin() {
            return Err(Error::AlreadyRunning);
        }

        let mut threads = self.threads.lock();
        match self.launch(address, port, backlog) {
            Ok((launched, local_addr)) => {
                *threads = Some(launched);
                *self.local_addr.lock() = Some(local_addr);
                info!(address = %local_addr, backlog, "server listening");
                Ok(())
            }
            Err(err) => {
                self.control.finish();
                Err(err)
            }
        }
    }

    /// Starts on the address, port and backlog held in the configuration.
    pub fn start_with_config(&self) -> Result<(), Error> {
        let address = self.config.address.clone();
        self.start(&address, self.config.port, self.config.backlog)
    }

    fn launch(
        &self,
        address: &str,
        port: u16,
        backlog: i32,
    ) -> Result<(Threads, SocketAddr), Error> {
        let target = resolve(address, port)
            .map_err(|_| Error::InvalidAddress(format!("{address}:{port}")))?;

        let listener = Listener::bind(
            &target,
            ListenOptions {
                backlog,
                reuse_address: self.config.reuse_address,
                buffer_scale: self.config.socket_buffer_scale,
            },
        )
        .map_err(|source| Error::Bind {
            address: target.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr();

        let dropped = self.queues.reopen();
        if dropped > 0 {
            debug!(events = dropped, "discarded events left from previous run");
        }

        let reactor = Reactor::new(
            listener,
            self.registry.clone(),
            self.queues.clone(),
            self.control.clone(),
            ReactorOptions {
                poll_timeout: self.config.poll_timeout,
                max_events: self.config.max_events,
                lifecycle_events: self.config.lifecycle_events,
            },
        )
        .map_err(Error::Poller)?;

        let receive_worker = ReceiveWorker::new(
            self.queues.receive.clone(),
            self.queues.inbound.clone(),
            self.config.read_chunk_size,
            self.config.lock_timeout,
            self.config.lifecycle_events,
        );
        let send_worker = SendWorker::new(
            self.queues.send.clone(),
            self.config.lock_timeout,
            self.config.send_retry_backoff,
        );

        let receiver = thread::Builder::new()
            .name("iosock-recv".into())
            .spawn(move || receive_worker.run())
            .map_err(Error::Spawn)?;

        let sender = match thread::Builder::new()
            .name("iosock-send".into())
            .spawn(move || send_worker.run())
        {
            Ok(sender) => sender,
            Err(err) => {
                // Dropping the reactor shuts the queues down.
                drop(reactor);
                let _ = receiver.join();
                return Err(Error::Spawn(err));
            }
        };

        let control = self.control.clone();
        let event_loop = thread::Builder::new()
            .name("iosock-event-loop".into())
            .spawn(move || run_event_loop(reactor, &control));

        let event_loop = match event_loop {
            Ok(event_loop) => event_loop,
            Err(err) => {
                // The reactor was dropped with the failed closure.
                let _ = receiver.join();
                let _ = sender.join();
                return Err(Error::Spawn(err));
            }
        };

        Ok((
            Threads {
                event_loop,
                receiver,
                sender,
            },
            local_addr,
        ))
    }

    /// Queues `data` for `handle` and returns immediately.
    ///
    /// Data for a connection that is already gone is dropped with a log
    /// line. Use [`Server::try_send`] to learn why data was not queued.
    pub fn send(&self, handle: ConnectionHandle, data: impl Into<Vec<u8>>) {
        match self.try_send(handle, data) {
            Ok(()) | Err(SendError::Empty) => {}
            Err(err) => warn!(%handle, error = %err, "send dropped"),
        }
    }

    /// Queues `data` for `handle`, reporting why it could not be queued.
    ///
    /// Bytes queued by successive calls for the same handle reach the wire
    /// in call order. Exceeding the outbound limit shuts the connection down.
    pub fn try_send(
        &self,
        handle: ConnectionHandle,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), SendError> {
        let data = data.into();
        if data.is_empty() {
            return Err(SendError::Empty);
        }

        let connection = self
            .registry
            .get(handle)
            .ok_or(SendError::UnknownHandle(handle))?;

        match connection.enqueue(data, self.config.max_outbound_bytes) {
            Ok(()) => {
                if connection.schedule() {
                    self.queues.send.push(connection);
                }
                Ok(())
            }
            Err(err @ SendError::OutboundLimit { .. }) => {
                connection.close();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Blocks until data arrives on any connection.
    ///
    /// # Returns
    /// The next [`Message`], or `None` once the server has shut down. Calls
    /// made after that keep returning `None`.
    pub fn receive(&self) -> Option<Message> {
        loop {
            match self.queues.inbound.pop()? {
                ServerEvent::Data(message) => return Some(message),
                _ => continue,
            }
        }
    }

    /// Like [`Server::receive`], but gives up after `timeout`.
    ///
    /// `None` means either the timeout elapsed or the server shut down.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.next_event_until(deadline)? {
                ServerEvent::Data(message) => return Some(message),
                _ => continue,
            }
        }
    }

    /// Returns a message if one is already queued, without blocking.
    pub fn try_receive(&self) -> Option<Message> {
        loop {
            match self.queues.inbound.try_pop() {
                Popped::Item(ServerEvent::Data(message)) => return Some(message),
                Popped::Item(_) => continue,
                Popped::Shutdown | Popped::Empty => return None,
            }
        }
    }

    /// Blocks until the next event, lifecycle events included.
    pub fn next_event(&self) -> Option<ServerEvent> {
        self.queues.inbound.pop()
    }

    /// Like [`Server::next_event`], but gives up after `timeout`.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<ServerEvent> {
        self.next_event_until(Instant::now() + timeout)
    }

    fn next_event_until(&self, deadline: Instant) -> Option<ServerEvent> {
        let remaining = deadline.saturating_duration_since(Instant::now());

        match self.queues.inbound.pop_timeout(remaining) {
            Popped::Item(event) => Some(event),
            Popped::Shutdown | Popped::Empty => None,
        }
    }

    /// Half-closes one connection in both directions.
    ///
    /// The event loop then tears it down like any other closed connection.
    ///
    /// # Returns
    /// `false` if no connection has this handle
    pub fn shutdown_client(&self, handle: ConnectionHandle) -> bool {
        match self.registry.get(handle) {
            Some(connection) => {
                debug!(%handle, "shutting down connection");
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Number of registered connections.
    pub fn connections(&self) -> usize {
        self.registry.len()
    }

    pub fn is_connected(&self, handle: ConnectionHandle) -> bool {
        self.registry.contains(handle)
    }

    /// Bytes queued for `handle` and not yet written, if it is connected.
    pub fn pending_bytes(&self, handle: ConnectionHandle) -> Option<usize> {
        self.registry
            .get(handle)
            .map(|connection| connection.pending_bytes())
    }

    pub fn state(&self) -> LoopState {
        self.control.current()
    }

    /// The bound address while the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Requests a graceful stop and waits for every thread to exit.
    ///
    /// # Errors
    /// The terminal error of the event loop, if it died of one.
    pub fn stop(&self) -> Result<(), Error> {
        if self.control.request_stop() {
            info!("stopping server");
        }

        self.join()
    }

    /// Waits for every thread to exit without requesting a stop.
    ///
    /// Returns immediately if the server is not running. Concurrent callers
    /// wait for the first one to finish.
    pub fn join(&self) -> Result<(), Error> {
        let mut threads = self.threads.lock();
        let Some(Threads {
            event_loop,
            receiver,
            sender,
        }) = threads.take()
        else {
            return Ok(());
        };

        let mut result = event_loop
            .join()
            .unwrap_or(Err(Error::ThreadPanicked("event loop")));

        // The event loop signals the workers on exit; repeat in case it panicked.
        self.queues.receive.shutdown();
        self.queues.send.shutdown();

        if receiver.join().is_err() && result.is_ok() {
            result = Err(Error::ThreadPanicked("receive worker"));
        }
        if sender.join().is_err() && result.is_ok() {
            result = Err(Error::ThreadPanicked("send worker"));
        }

        for connection in self.registry.drain() {
            connection.close();
        }

        // Release connections still referenced by unprocessed triggers.
        let abandoned = self.queues.receive.reopen() + self.queues.send.reopen();
        if abandoned > 0 {
            debug!(triggers = abandoned, "dropped unprocessed triggers");
        }
        self.queues.shutdown_all();

        *self.local_addr.lock() = None;
        self.control.finish();
        info!("server stopped");

        result
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "server stopped with error");
        }
    }
}
