//! Per-connection state.
//!
//! A [`Connection`] is created on accept and owned by the registry. Workers
//! and triggers hold extra `Arc` references; the socket closes when the last
//! one is dropped.

use crate::error::SendError;
use crate::message::ConnectionHandle;
use crate::net::socket::Socket;

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::trace;

/// Outbound bookkeeping, guarded by the connection's send lock.
#[derive(Debug, Default)]
pub(crate) struct Outbound {
    queue: VecDeque<Vec<u8>>,
    partial: Vec<u8>,
    offset: usize,
    queued_bytes: usize,
    failed: bool,
}

impl Outbound {
    /// Bytes of the current item still to flush, pulling the next queued item
    /// in when the current one is finished.
    pub(crate) fn current(&mut self) -> Option<&[u8]> {
        if self.offset >= self.partial.len() {
            let next = self.queue.pop_front()?;
            self.queued_bytes -= next.len();
            self.partial = next;
            self.offset = 0;
        }

        Some(&self.partial[self.offset..])
    }

    /// Marks `n` bytes of the current item as written.
    pub(crate) fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.partial.len());

        if self.offset == self.partial.len() {
            self.partial = Vec::new();
            self.offset = 0;
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.offset < self.partial.len() || !self.queue.is_empty()
    }

    pub(crate) fn pending_bytes(&self) -> usize {
        self.queued_bytes + (self.partial.len() - self.offset)
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed
    }

    /// Drops everything still queued and refuses further data.
    ///
    /// # Returns
    /// The number of bytes discarded
    pub(crate) fn fail(&mut self) -> usize {
        let dropped = self.discard();
        self.failed = true;
        dropped
    }

    pub(crate) fn discard(&mut self) -> usize {
        let dropped = self.pending_bytes();

        self.queue.clear();
        self.partial = Vec::new();
        self.offset = 0;
        self.queued_bytes = 0;

        dropped
    }
}

/// State of one accepted connection.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    peer: Option<SocketAddr>,
    socket: Socket,
    outbound: Mutex<Outbound>,
    inbound: Mutex<()>,
    // Set while a send trigger for this connection is queued or in flight.
    scheduled: AtomicBool,
}

impl Connection {
    pub(crate) fn new(handle: ConnectionHandle, socket: Socket) -> Self {
        let peer = socket.peer_addr().ok();

        Self {
            handle,
            peer,
            socket,
            outbound: Mutex::new(Outbound::default()),
            inbound: Mutex::new(()),
            scheduled: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Bytes queued for this connection and not yet written.
    pub fn pending_bytes(&self) -> usize {
        self.outbound.lock().pending_bytes()
    }

    /// Appends `data` to the outbound queue.
    ///
    /// # Arguments
    /// * `data` - The bytes to queue, sent after everything queued before them
    /// * `limit` - Optional cap on queued plus partially sent bytes
    pub(crate) fn enqueue(&self, data: Vec<u8>, limit: Option<usize>) -> Result<(), SendError> {
        let mut outbound = self.outbound.lock();

        if outbound.is_failed() {
            return Err(SendError::Closed(self.handle));
        }

        if let Some(limit) = limit
            && outbound.pending_bytes().saturating_add(data.len()) > limit
        {
            return Err(SendError::OutboundLimit {
                handle: self.handle,
                limit,
            });
        }

        outbound.queued_bytes += data.len();
        outbound.queue.push_back(data);

        trace!(handle = %self.handle, pending = outbound.pending_bytes(), "queued outbound data");

        Ok(())
    }

    /// Claims the single send trigger slot.
    ///
    /// # Returns
    /// `true` if the caller must push a trigger, `false` if one is already
    /// queued or being processed
    pub(crate) fn schedule(&self) -> bool {
        !self.scheduled.swap(true, Ordering::SeqCst)
    }

    /// Releases the trigger slot once the send worker is done with it.
    ///
    /// Data queued between the worker's last check and the release would be
    /// left without a trigger, so the slot is claimed again if anything is
    /// pending.
    pub(crate) fn unschedule(&self) -> bool {
        self.scheduled.store(false, Ordering::SeqCst);

        let pending = {
            let outbound = self.outbound.lock();
            outbound.has_pending() && !outbound.is_failed()
        };

        pending && self.schedule()
    }

    pub(crate) fn try_lock_outbound(&self, timeout: Duration) -> Option<MutexGuard<'_, Outbound>> {
        self.outbound.try_lock_for(timeout)
    }

    pub(crate) fn lock_outbound(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock()
    }

    pub(crate) fn try_lock_inbound(&self, timeout: Duration) -> Option<MutexGuard<'_, ()>> {
        self.inbound.try_lock_for(timeout)
    }

    pub(crate) fn lock_inbound(&self) -> MutexGuard<'_, ()> {
        self.inbound.lock()
    }

    /// Half-closes both directions, ignoring errors from a peer that is
    /// already gone.
    pub(crate) fn close(&self) {
        if let Err(err) = self.socket.shutdown() {
            trace!(handle = %self.handle, error = %err, "shutdown on dead socket");
        }
    }
}
