use std::os::fd::RawFd;

/// One readiness report, translated from the platform's poller format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    file_descriptor: RawFd,
    readable: bool,
    closed: bool,
    error: bool,
}

impl Event {
    pub(crate) fn new(file_descriptor: RawFd, readable: bool, closed: bool, error: bool) -> Self {
        Self {
            file_descriptor,
            readable,
            closed,
            error,
        }
    }

    pub(crate) fn get_fd(&self) -> RawFd {
        self.file_descriptor
    }

    pub(crate) fn is_readable(&self) -> bool {
        self.readable
    }

    /// Peer hung up or closed its write side.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_error(&self) -> bool {
        self.error
    }
}
