use crate::message::{ConnectionHandle, ServerEvent};
use crate::net::listener::Listener;
use crate::reactor::event::Event;
use crate::reactor::poller::{Interest, Poller};
use crate::reactor::registry::ClientRegistry;
use crate::reactor::socket::accept_client;
use crate::runtime::Queues;
use crate::runtime::driver::LoopControl;
use crate::runtime::receive::ReceiveTrigger;

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

// How long the listener stays unwatched after accept failed for a reason
// other than an empty backlog (descriptor exhaustion, typically).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Event loop state: the poller, the listener and the dispatch rules.
///
/// Owned by the event loop thread. It is the only code that calls into the
/// poller and the only code that inserts into or removes from the registry.
pub(crate) struct Reactor {
    poller: Poller,
    events: Vec<Event>,
    listener: Option<Listener>,
    listener_fd: RawFd,
    registry: Arc<ClientRegistry>,
    queues: Queues,
    control: Arc<LoopControl>,
    poll_timeout: Duration,
    accept_batch: usize,
    accept_paused_until: Option<Instant>,
    lifecycle_events: bool,
}

pub(crate) struct ReactorOptions {
    pub(crate) poll_timeout: Duration,
    pub(crate) max_events: usize,
    pub(crate) lifecycle_events: bool,
}

impl Reactor {
    pub(crate) fn new(
        listener: Listener,
        registry: Arc<ClientRegistry>,
        queues: Queues,
        control: Arc<LoopControl>,
        options: ReactorOptions,
    ) -> io::Result<Self> {
        let poller = Poller::new(options.max_events)?;
        let listener_fd = listener.as_raw_fd();
        poller.register(listener_fd, Interest::LISTENER)?;

        Ok(Self {
            poller,
            events: Vec::with_capacity(options.max_events),
            listener: Some(listener),
            listener_fd,
            registry,
            queues,
            control,
            poll_timeout: options.poll_timeout,
            accept_batch: options.max_events.max(1),
            accept_paused_until: None,
            lifecycle_events: options.lifecycle_events,
        })
    }

    /// Runs one poll iteration and dispatches what became ready.
    pub(crate) fn turn(&mut self) -> io::Result<()> {
        self.resume_accepting();

        let mut events = mem::take(&mut self.events);
        let polled = self.poller.poll(&mut events, self.poll_timeout);

        if polled.is_ok() {
            for event in &events {
                self.dispatch(event);
            }
        }

        self.events = events;
        polled
    }

    fn dispatch(&mut self, event: &Event) {
        if event.get_fd() == self.listener_fd {
            if event.is_closed() || event.is_error() {
                warn!("listener reported EOF, stopping");
                self.control.request_stop();
            } else if event.is_readable() {
                self.accept_ready();
            }
            return;
        }

        let handle = ConnectionHandle::from(event.get_fd());
        let Some(connection) = self.registry.get(handle) else {
            trace!(%handle, "event for unregistered descriptor");
            return;
        };

        if event.is_readable() {
            self.queues
                .receive
                .push(ReceiveTrigger::Readable(connection));
        }

        if event.is_error() {
            debug!(%handle, "socket error reported");
        }

        if event.is_closed() || event.is_error() {
            self.close_client(handle);
        }
    }

    fn accept_ready(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        for _ in 0..self.accept_batch {
            match accept_client(listener, &self.poller, &self.registry) {
                Ok(Some(connection)) => {
                    let handle = connection.handle();
                    let peer = connection.peer_addr();
                    debug!(%handle, ?peer, "accepted connection");

                    if self.lifecycle_events {
                        self.queues
                            .inbound
                            .push(ServerEvent::Connected { handle, peer });
                    }
                }
                Ok(None) => break,
                Err(err) if err.kind() == io::ErrorKind::ConnectionAborted => {
                    debug!("peer aborted before accept");
                }
                Err(err) => {
                    warn!(error = %err, delay = ?ACCEPT_RETRY_DELAY, "accept failed, pausing");
                    self.pause_accepting();
                    break;
                }
            }
        }
    }

    // The listener is level-triggered: while accept keeps failing it would
    // be reported on every poll, so it is unwatched for a while instead.
    fn pause_accepting(&mut self) {
        if let Err(err) = self.poller.deregister(self.listener_fd) {
            trace!(error = %err, "deregister listener failed");
        }
        self.accept_paused_until = Some(Instant::now() + ACCEPT_RETRY_DELAY);
    }

    fn resume_accepting(&mut self) {
        let Some(until) = self.accept_paused_until else {
            return;
        };
        if Instant::now() < until || self.listener.is_none() {
            return;
        }

        match self.poller.register(self.listener_fd, Interest::LISTENER) {
            Ok(()) => {
                debug!("accepting again");
                self.accept_paused_until = None;
            }
            Err(err) => {
                warn!(error = %err, "re-watching listener failed");
                self.accept_paused_until = Some(Instant::now() + ACCEPT_RETRY_DELAY);
            }
        }
    }

    /// Drops the watch and the registry entry, then hands the connection to
    /// the receive worker for its final drain and shutdown.
    fn close_client(&mut self, handle: ConnectionHandle) {
        let Some(connection) = self.registry.remove(handle) else {
            return;
        };

        if let Err(err) = self.poller.deregister(handle.as_raw()) {
            trace!(%handle, error = %err, "deregister failed");
        }

        debug!(%handle, "peer closed connection");
        self.queues.receive.push(ReceiveTrigger::Closed(connection));
    }

    /// Closes the listener and every registered connection, then signals the
    /// workers to finish.
    pub(crate) fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            if let Err(err) = self.poller.deregister(listener.as_raw_fd()) {
                trace!(error = %err, "deregister listener failed");
            }
            info!(address = %listener.local_addr(), "listener closed");
        }

        let connections = self.registry.drain();
        let count = connections.len();
        for connection in connections {
            if let Err(err) = self.poller.deregister(connection.handle().as_raw()) {
                trace!(handle = %connection.handle(), error = %err, "deregister failed");
            }
            self.queues.receive.push(ReceiveTrigger::Closed(connection));
        }
        if count > 0 {
            debug!(connections = count, "closing remaining connections");
        }

        self.queues.receive.shutdown();
        self.queues.send.shutdown();
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if self.listener.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::listener::ListenOptions;
    use crate::runtime::driver::{LoopState, run_event_loop};
    use std::net::{SocketAddr, TcpStream};
    use std::thread;

    fn reactor() -> (Reactor, SocketAddr, Arc<ClientRegistry>, Queues, Arc<LoopControl>) {
        let address: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = Listener::bind(
            &address,
            ListenOptions {
                backlog: 5,
                reuse_address: true,
                buffer_scale: 1,
            },
        )
        .unwrap();
        let local_addr = listener.local_addr();

        let registry = Arc::new(ClientRegistry::new());
        let queues = Queues::closed();
        queues.reopen();
        let control = Arc::new(LoopControl::new());
        assert!(control.begin());

        let reactor = Reactor::new(
            listener,
            registry.clone(),
            queues.clone(),
            control.clone(),
            ReactorOptions {
                poll_timeout: Duration::from_millis(10),
                max_events: 8,
                lifecycle_events: false,
            },
        )
        .unwrap();

        (reactor, local_addr, registry, queues, control)
    }

    #[test]
    fn accepts_and_registers_clients() {
        let (mut reactor, addr, registry, _queues, _control) = reactor();
        let _client = TcpStream::connect(addr).unwrap();

        for _ in 0..50 {
            reactor.turn().unwrap();
            if !registry.is_empty() {
                break;
            }
        }

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn paused_listener_accepts_after_delay() {
        let (mut reactor, addr, registry, _queues, _control) = reactor();
        reactor.pause_accepting();

        let _client = TcpStream::connect(addr).unwrap();
        reactor.turn().unwrap();
        assert!(registry.is_empty());

        thread::sleep(ACCEPT_RETRY_DELAY);
        for _ in 0..50 {
            reactor.turn().unwrap();
            if !registry.is_empty() {
                break;
            }
        }

        assert_eq!(registry.len(), 1);
        assert!(reactor.accept_paused_until.is_none());
    }

    // Shutting down a listening socket reports a hangup on Linux only.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn listener_hangup_stops_the_loop() {
        let (reactor, _addr, _registry, queues, control) = reactor();
        let ret = unsafe { libc::shutdown(reactor.listener_fd, libc::SHUT_RDWR) };
        assert_eq!(ret, 0);

        let loop_control = control.clone();
        let event_loop = thread::spawn(move || run_event_loop(reactor, &loop_control));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !event_loop.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let stopped_by_itself = event_loop.is_finished();
        control.request_stop();

        assert!(event_loop.join().unwrap().is_ok());
        assert!(stopped_by_itself, "event loop ignored the listener hangup");
        assert_eq!(control.current(), LoopState::Stopping);

        // Workers are told to finish.
        assert!(queues.receive.pop().is_none());
        assert!(queues.send.pop().is_none());
    }
}
