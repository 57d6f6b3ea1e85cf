//! Raw TCP plumbing over `libc`.
//!
//! - [`socket`]: [`Socket`], an owned non-blocking stream descriptor
//! - `listener`: the bound listening socket
//! - `utils`: address resolution and `sockaddr` conversion
//!
//! [`Socket`]: socket::Socket

pub(crate) mod listener;
pub mod socket;
pub(crate) mod utils;
