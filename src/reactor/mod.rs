//! Event-driven I/O reactor module.
//!
//! This module provides readiness polling and connection bookkeeping:
//! - `poller`: epoll / kqueue backends behind one interface
//! - `event`: platform-neutral readiness reports
//! - `core`: the event loop's dispatch rules
//! - [`registry`]: handle-to-connection map
//! - [`io`]: per-connection state
//! - `socket`: the accept path

pub(crate) mod core;
pub(crate) mod event;
pub mod io;
pub(crate) mod poller;
pub mod registry;
pub(crate) mod socket;
