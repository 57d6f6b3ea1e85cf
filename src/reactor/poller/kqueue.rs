use super::Interest;
use crate::reactor::event::Event;

use libc::{EV_ADD, EV_CLEAR, EV_DELETE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ};
use libc::{close, kevent, kqueue, timespec};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

pub(crate) struct KqueuePoller {
    kqueue: RawFd,
    events: Vec<kevent>,
}

// `udata` is always null and never dereferenced.
unsafe impl Send for KqueuePoller {}

impl KqueuePoller {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let kqueue = unsafe { kqueue() };
        if kqueue < 0 {
            return Err(io::Error::last_os_error());
        }

        let events = (0..capacity).map(|_| empty_kevent()).collect();

        Ok(KqueuePoller { kqueue, events })
    }

    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut flags = EV_ADD | EV_ENABLE;
        if interest.edge_triggered {
            flags |= EV_CLEAR;
        }

        self.apply(fd, flags)
    }

    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.apply(fd, EV_DELETE)
    }

    pub(crate) fn wait(&mut self, out: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        let ts = timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        };

        let n_events = unsafe {
            kevent(
                self.kqueue,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                &ts,
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
            let flags = raw.flags;

            out.push(Event::new(
                raw.ident as RawFd,
                raw.filter == EVFILT_READ,
                flags & EV_EOF != 0,
                flags & EV_ERROR != 0,
            ));
        }

        Ok(())
    }

    fn apply(&self, fd: RawFd, flags: u16) -> io::Result<()> {
        let mut event = empty_kevent();
        event.ident = fd as usize;
        event.filter = EVFILT_READ;
        event.flags = flags;

        let ret = unsafe { kevent(self.kqueue, &event, 1, ptr::null_mut(), 0, ptr::null()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            close(self.kqueue);
        }
    }
}

fn empty_kevent() -> kevent {
    unsafe { mem::zeroed() }
}
