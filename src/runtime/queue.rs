//! Blocking hand-off queue between threads.
//!
//! Provides the FIFO used for receive triggers, send triggers and inbound
//! events. Any number of producers and consumers may share one queue. A
//! shutdown sentinel wakes a blocked consumer; once a consumer has seen it,
//! it is put back so every other consumer sees it too.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::time::Duration;

enum Slot<T> {
    Item(T),
    Shutdown,
}

/// Outcome of a non-blocking or bounded pop.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Popped<T> {
    Item(T),
    Shutdown,
    Empty,
}

/// A thread-safe, unbounded FIFO with a sticky shutdown sentinel.
pub(crate) struct TriggerQueue<T> {
    sender: Sender<Slot<T>>,
    receiver: Receiver<Slot<T>>,
}

impl<T> TriggerQueue<T> {
    /// Creates an empty, open queue.
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }

    /// Creates a queue that already holds the shutdown sentinel.
    pub(crate) fn closed() -> Self {
        let queue = Self::new();
        queue.shutdown();
        queue
    }

    /// Enqueues an item behind everything pushed before it.
    pub(crate) fn push(&self, item: T) {
        // The queue owns a receiver, so the channel never disconnects.
        let _ = self.sender.send(Slot::Item(item));
    }

    /// Enqueues the shutdown sentinel.
    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(Slot::Shutdown);
    }

    /// Blocks until an item is available.
    ///
    /// # Returns
    /// `Some(item)`, or `None` once the sentinel is reached
    pub(crate) fn pop(&self) -> Option<T> {
        match self.receiver.recv() {
            Ok(Slot::Item(item)) => Some(item),
            Ok(Slot::Shutdown) | Err(_) => {
                self.shutdown();
                None
            }
        }
    }

    /// Blocks for at most `timeout`.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Popped<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Slot::Item(item)) => Popped::Item(item),
            Ok(Slot::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                self.shutdown();
                Popped::Shutdown
            }
            Err(RecvTimeoutError::Timeout) => Popped::Empty,
        }
    }

    pub(crate) fn try_pop(&self) -> Popped<T> {
        match self.receiver.try_recv() {
            Ok(Slot::Item(item)) => Popped::Item(item),
            Ok(Slot::Shutdown) | Err(TryRecvError::Disconnected) => {
                self.shutdown();
                Popped::Shutdown
            }
            Err(TryRecvError::Empty) => Popped::Empty,
        }
    }

    /// Discards everything queued, sentinel included.
    ///
    /// # Returns
    /// The number of items dropped, not counting sentinels
    pub(crate) fn reopen(&self) -> usize {
        let mut dropped = 0;
        while let Ok(slot) = self.receiver.try_recv() {
            if matches!(slot, Slot::Item(_)) {
                dropped += 1;
            }
        }

        dropped
    }

    /// Queued entries, sentinels included.
    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for TriggerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
