//! Thread plumbing: hand-off queues, the two I/O workers and the event loop
//! driver.

pub(crate) mod driver;
pub(crate) mod queue;
pub(crate) mod receive;
pub(crate) mod send;

use crate::message::ServerEvent;
use crate::reactor::io::Connection;

use queue::TriggerQueue;
use receive::ReceiveTrigger;
use std::sync::Arc;

/// The three queues connecting the event loop, the workers and the
/// application.
#[derive(Clone)]
pub(crate) struct Queues {
    /// Event loop -> receive worker.
    pub(crate) receive: Arc<TriggerQueue<ReceiveTrigger>>,
    /// `Server::send` -> send worker, and send worker retries.
    pub(crate) send: Arc<TriggerQueue<Arc<Connection>>>,
    /// Receive worker and event loop -> application.
    pub(crate) inbound: Arc<TriggerQueue<ServerEvent>>,
}

impl Queues {
    /// Queues in the shut-down state, as seen before the first start.
    pub(crate) fn closed() -> Self {
        Self {
            receive: Arc::new(TriggerQueue::closed()),
            send: Arc::new(TriggerQueue::closed()),
            inbound: Arc::new(TriggerQueue::closed()),
        }
    }

    /// Drops leftovers of a previous run.
    ///
    /// # Returns
    /// The number of undelivered inbound events that were discarded
    pub(crate) fn reopen(&self) -> usize {
        self.receive.reopen();
        self.send.reopen();
        self.inbound.reopen()
    }

    /// Pushes the sentinel into every queue.
    pub(crate) fn shutdown_all(&self) {
        self.receive.shutdown();
        self.send.shutdown();
        self.inbound.shutdown();
    }
}
