//! Send worker.
//!
//! Flushes queued outbound data for connections named by send triggers.
//! Each trigger gets one non-blocking write; a connection with data left is
//! queued again behind everything else, so one slow peer cannot starve the
//! others.

use crate::reactor::io::Connection;
use crate::runtime::queue::TriggerQueue;

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub(crate) struct SendWorker {
    triggers: Arc<TriggerQueue<Arc<Connection>>>,
    lock_timeout: Duration,
    retry_backoff: Duration,
    // Would-block results since the last successful write.
    stalled: usize,
}

impl SendWorker {
    pub(crate) fn new(
        triggers: Arc<TriggerQueue<Arc<Connection>>>,
        lock_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            triggers,
            lock_timeout,
            retry_backoff,
            stalled: 0,
        }
    }

    /// Processes triggers until the sentinel arrives.
    pub(crate) fn run(mut self) {
        debug!("send worker started");

        while let Some(connection) = self.triggers.pop() {
            self.flush(connection);
        }

        // Retries queued behind the sentinel are dropped with their triggers.
        let abandoned = self.triggers.len().saturating_sub(1);
        if abandoned > 0 {
            debug!(triggers = abandoned, "send worker exiting with pending work");
        } else {
            debug!("send worker exiting");
        }
    }

    fn flush(&mut self, connection: Arc<Connection>) {
        let handle = connection.handle();

        let Some(mut outbound) = connection.try_lock_outbound(self.lock_timeout) else {
            trace!(%handle, "send lock busy, retrying later");
            self.triggers.push(connection.clone());
            return;
        };

        let result = if outbound.is_failed() {
            None
        } else {
            outbound.current().map(|chunk| connection.socket().send(chunk))
        };

        let Some(result) = result else {
            drop(outbound);
            self.release(connection);
            return;
        };

        let would_block = match result {
            Ok(0) => true,
            Ok(n) => {
                trace!(%handle, bytes = n, "wrote chunk");
                outbound.advance(n);
                self.stalled = 0;
                false
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => true,
            Err(err) => {
                let dropped = outbound.fail();
                drop(outbound);

                warn!(%handle, error = %err, bytes = dropped, "send failed, discarding queued data");
                connection.close();
                self.release(connection);
                return;
            }
        };

        let pending = outbound.has_pending();
        drop(outbound);

        if pending {
            self.requeue(connection, would_block);
        } else {
            self.release(connection);
        }
    }

    fn requeue(&mut self, connection: Arc<Connection>, would_block: bool) {
        if would_block {
            self.stalled += 1;

            // Every queued connection blocked since the last write; let the
            // peers drain before trying again.
            if self.stalled > self.triggers.len() {
                thread::sleep(self.retry_backoff);
                self.stalled = 0;
            }
        }

        self.triggers.push(connection);
    }

    fn release(&self, connection: Arc<Connection>) {
        if connection.unschedule() {
            self.triggers.push(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use crate::message::ConnectionHandle;
    use crate::net::socket::Socket;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsRawFd;

    fn connection() -> (Arc<Connection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let socket = Socket::from(accepted);
        socket.set_nonblocking().unwrap();
        socket.suppress_sigpipe().unwrap();
        let handle = ConnectionHandle::from(socket.as_raw_fd());

        (Arc::new(Connection::new(handle, socket)), client)
    }

    fn worker() -> (SendWorker, Arc<TriggerQueue<Arc<Connection>>>) {
        let triggers = Arc::new(TriggerQueue::new());
        let worker = SendWorker::new(
            triggers.clone(),
            Duration::from_millis(10),
            Duration::from_millis(1),
        );

        (worker, triggers)
    }

    #[test]
    fn finished_connection_frees_its_trigger_slot() {
        let (connection, mut client) = connection();
        let (mut worker, triggers) = worker();

        connection.enqueue(b"hello".to_vec(), None).unwrap();
        assert!(connection.schedule());
        worker.flush(connection.clone());

        assert!(triggers.is_empty());
        assert_eq!(connection.pending_bytes(), 0);
        assert!(connection.schedule());

        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn write_error_discards_the_queue() {
        let (connection, client) = connection();
        let (mut worker, triggers) = worker();

        // Linger of zero turns the close into a reset.
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        let rc = unsafe {
            libc::setsockopt(
                client.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const libc::linger as *const libc::c_void,
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0);
        drop(client);
        thread::sleep(Duration::from_millis(50));

        connection.enqueue(vec![7u8; 4096], None).unwrap();
        assert!(connection.schedule());
        worker.flush(connection.clone());

        assert!(triggers.is_empty());
        assert_eq!(connection.pending_bytes(), 0);
        assert_eq!(
            connection.enqueue(b"more".to_vec(), None),
            Err(SendError::Closed(connection.handle()))
        );
    }
}
