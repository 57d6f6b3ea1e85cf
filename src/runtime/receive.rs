//! Receive worker.
//!
//! Turns "connection is readable" triggers from the event loop into
//! [`ServerEvent::Data`] items on the inbound queue, so the event loop never
//! performs a read itself.

use crate::message::{Message, ServerEvent};
use crate::reactor::io::Connection;
use crate::runtime::queue::TriggerQueue;

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Work handed to the receive worker by the event loop.
pub(crate) enum ReceiveTrigger {
    /// The connection reported read readiness.
    Readable(Arc<Connection>),
    /// The connection was removed from the registry. Queued after any
    /// `Readable` for the same connection, so trailing bytes are drained
    /// before the socket is shut.
    Closed(Arc<Connection>),
}

// Result of draining one connection.
struct Drained {
    payload: Vec<u8>,
    eof: bool,
}

pub(crate) struct ReceiveWorker {
    triggers: Arc<TriggerQueue<ReceiveTrigger>>,
    inbound: Arc<TriggerQueue<ServerEvent>>,
    chunk: Vec<u8>,
    lock_timeout: Duration,
    lifecycle_events: bool,
}

impl ReceiveWorker {
    pub(crate) fn new(
        triggers: Arc<TriggerQueue<ReceiveTrigger>>,
        inbound: Arc<TriggerQueue<ServerEvent>>,
        chunk_size: usize,
        lock_timeout: Duration,
        lifecycle_events: bool,
    ) -> Self {
        Self {
            triggers,
            inbound,
            chunk: vec![0u8; chunk_size.max(1)],
            lock_timeout,
            lifecycle_events,
        }
    }

    /// Processes triggers until the sentinel arrives, then forwards the
    /// sentinel to the inbound queue.
    pub(crate) fn run(mut self) {
        debug!("receive worker started");

        while let Some(trigger) = self.triggers.pop() {
            match trigger {
                ReceiveTrigger::Readable(connection) => self.on_readable(connection),
                ReceiveTrigger::Closed(connection) => self.on_closed(connection),
            }
        }

        self.inbound.shutdown();
        debug!("receive worker exiting");
    }

    fn on_readable(&mut self, connection: Arc<Connection>) {
        let drained = connection
            .try_lock_inbound(self.lock_timeout)
            .map(|_guard| self.drain(&connection));

        let Some(drained) = drained else {
            trace!(handle = %connection.handle(), "receive lock busy, retrying later");
            self.triggers.push(ReceiveTrigger::Readable(connection));
            return;
        };

        if drained.eof {
            // Cleanup belongs to the event loop, which sees the same EOF.
            trace!(handle = %connection.handle(), "peer finished sending");
        }

        self.publish(&connection, drained.payload);
    }

    fn on_closed(&mut self, connection: Arc<Connection>) {
        let handle = connection.handle();

        let drained = {
            let _guard = connection.lock_inbound();
            self.drain(&connection)
        };
        self.publish(&connection, drained.payload);

        connection.close();

        let dropped = connection.lock_outbound().fail();
        if dropped > 0 {
            debug!(%handle, bytes = dropped, "discarded unsent data of closed connection");
        }

        if self.lifecycle_events {
            self.inbound.push(ServerEvent::Closed { handle });
        }

        debug!(%handle, "connection closed");
    }

    // Reads until the socket would block, reports EOF, or fails.
    fn drain(&mut self, connection: &Connection) -> Drained {
        let mut payload = Vec::new();

        let eof = loop {
            match connection.socket().recv(&mut self.chunk) {
                Ok(0) => break true,
                Ok(n) => {
                    trace!(handle = %connection.handle(), bytes = n, "read chunk");
                    payload.extend_from_slice(&self.chunk[..n]);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break false,
                Err(err) => {
                    debug!(handle = %connection.handle(), error = %err, "read failed");
                    break true;
                }
            }
        };

        Drained { payload, eof }
    }

    fn publish(&self, connection: &Connection, payload: Vec<u8>) {
        if payload.is_empty() {
            return;
        }

        trace!(handle = %connection.handle(), bytes = payload.len(), "publishing message");
        self.inbound
            .push(ServerEvent::Data(Message::new(connection.handle(), payload)));
    }
}
