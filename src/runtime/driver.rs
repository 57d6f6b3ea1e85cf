//! Event loop thread body and lifecycle state.
//!
//! The loop polls with a bounded timeout so a stop request is noticed within
//! one poll interval even when no I/O happens.

use crate::error::Error;
use crate::reactor::core::Reactor;

use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, error};

/// Lifecycle of the event loop.
///
/// `Stopped -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

/// Shared view of the loop state.
#[derive(Debug)]
pub(crate) struct LoopControl {
    state: AtomicU8,
}

impl LoopControl {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Stopped as u8),
        }
    }

    pub(crate) fn current(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `Stopped -> Running`. Fails if the loop is in any other state.
    pub(crate) fn begin(&self) -> bool {
        self.transition(LoopState::Stopped, LoopState::Running)
    }

    /// `Running -> Stopping`. Returns `false` if the loop was not running.
    pub(crate) fn request_stop(&self) -> bool {
        self.transition(LoopState::Running, LoopState::Stopping)
    }

    /// Back to `Stopped` once every thread has been joined.
    pub(crate) fn finish(&self) {
        self.state.store(LoopState::Stopped as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: LoopState, to: LoopState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Drives `reactor` until a stop is requested or the poller fails.
///
/// Whatever the exit reason, the reactor's shutdown runs before returning so
/// the workers and any blocked `receive` caller are released.
pub(crate) fn run_event_loop(mut reactor: Reactor, control: &LoopControl) -> Result<(), Error> {
    debug!("event loop started");

    let mut result = Ok(());

    while control.current() == LoopState::Running {
        if let Err(err) = reactor.turn() {
            error!(error = %err, "poller failed, stopping event loop");
            control.request_stop();
            result = Err(Error::Poller(err));
            break;
        }
    }

    reactor.shutdown();
    debug!("event loop exited");

    result
}
