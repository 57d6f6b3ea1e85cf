use super::Interest;
use crate::reactor::event::Event;

use libc::{EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN};
use libc::{EPOLLRDHUP, close, epoll_create1, epoll_ctl, epoll_event, epoll_wait};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub(crate) struct EpollPoller {
    epoll: RawFd,
    events: Vec<epoll_event>,
}

impl EpollPoller {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let events = vec![epoll_event { events: 0, u64: 0 }; capacity];

        Ok(EpollPoller { epoll, events })
    }

    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut mask = EPOLLIN | EPOLLRDHUP;
        if interest.edge_triggered {
            mask |= EPOLLET;
        }

        let mut event = epoll_event {
            events: mask as u32,
            u64: fd as u64,
        };

        let ret = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        // Kernels before 2.6.9 reject a null event pointer on delete.
        let mut event = epoll_event { events: 0, u64: 0 };

        let ret = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    pub(crate) fn wait(&mut self, out: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        let timeout_ms = timeout_millis(timeout);

        let n_events = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };

        if n_events < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }

            return Err(err);
        }

        for raw in self.events.iter().take(n_events as usize) {
            // Copy out of the packed struct before testing bits.
            let flags = raw.events;
            let token = raw.u64;

            out.push(Event::new(
                token as RawFd,
                flags & EPOLLIN as u32 != 0,
                flags & (EPOLLHUP | EPOLLRDHUP) as u32 != 0,
                flags & EPOLLERR as u32 != 0,
            ));
        }

        Ok(())
    }
}

// Rounded up, so a short non-zero timeout never turns into a busy poll.
fn timeout_millis(timeout: Duration) -> i32 {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(i32::MAX as u128) as i32
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            close(self.epoll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_millisecond_timeouts_round_up() {
        assert_eq!(timeout_millis(Duration::ZERO), 0);
        assert_eq!(timeout_millis(Duration::from_micros(1)), 1);
        assert_eq!(timeout_millis(Duration::from_micros(500)), 1);
        assert_eq!(timeout_millis(Duration::from_millis(100)), 100);
        assert_eq!(timeout_millis(Duration::from_micros(100_001)), 101);
        assert_eq!(timeout_millis(Duration::MAX), i32::MAX);
    }

    #[test]
    fn short_timeout_still_waits() {
        let mut poller = EpollPoller::new(4).unwrap();
        let mut events = Vec::new();

        let started = std::time::Instant::now();
        poller.wait(&mut events, Duration::from_micros(200)).unwrap();

        assert!(events.is_empty());
        assert!(started.elapsed() >= Duration::from_micros(200));
    }
}
