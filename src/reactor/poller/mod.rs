//! OS readiness notification.
//!
//! Only the event loop thread touches the poller. Backends:
//! - `epoll` on Linux and Android
//! - `kqueue` on macOS and the BSDs

use crate::reactor::event::Event;

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;
#[cfg(any(target_os = "linux", target_os = "android"))]
use epoll::EpollPoller as Backend;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
use kqueue::KqueuePoller as Backend;

/// How a descriptor is watched. Only read readiness is ever requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) edge_triggered: bool,
}

impl Interest {
    /// Level-triggered: pending connections are reported until accepted.
    pub(crate) const LISTENER: Self = Self {
        edge_triggered: false,
    };

    /// Edge-triggered: the receive worker drains to would-block on each report.
    pub(crate) const CLIENT: Self = Self {
        edge_triggered: true,
    };
}

pub(crate) struct Poller {
    backend: Backend,
}

impl Poller {
    /// Creates a poller that reports at most `capacity` events per wait.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            backend: Backend::new(capacity.max(1))?,
        })
    }

    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.backend.register(fd, interest)
    }

    /// Removes the watch for `fd`. Removing a watch that is already gone is
    /// not an error.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        match self.backend.deregister(fd) {
            Err(err) if matches!(err.raw_os_error(), Some(libc::ENOENT) | Some(libc::EBADF)) => {
                Ok(())
            }
            other => other,
        }
    }

    /// Waits up to `timeout` and replaces the contents of `events` with what
    /// became ready. An interrupted wait reports no events.
    pub(crate) fn poll(&mut self, events: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        events.clear();
        self.backend.wait(events, timeout)
    }
}
