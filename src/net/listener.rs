//! Bound, listening TCP socket.
//!
//! The listener is created by `Server::start` on the caller's thread so that
//! bind failures surface synchronously, then moved into the event loop which
//! accepts from it until shutdown.

use crate::net::socket::Socket;
use crate::net::utils::socketaddr_to_raw;

use libc::{AF_INET, AF_INET6, SO_RCVBUF, SO_REUSEADDR, SO_SNDBUF, SOCK_STREAM, SOL_SOCKET};
use libc::{accept, bind, listen, sockaddr, socket};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;

/// Socket options applied before `bind`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ListenOptions {
    pub(crate) backlog: i32,
    pub(crate) reuse_address: bool,
    pub(crate) buffer_scale: u32,
}

/// A non-blocking listening socket.
#[derive(Debug)]
pub struct Listener {
    socket: Socket,
    local_addr: SocketAddr,
}

impl Listener {
    /// Creates a socket, applies `options`, binds it to `address` and starts
    /// listening.
    ///
    /// # Returns
    /// The listener on success, or the OS error of the first failing step
    pub(crate) fn bind(address: &SocketAddr, options: ListenOptions) -> io::Result<Self> {
        let domain = match address {
            SocketAddr::V4(_) => AF_INET,
            SocketAddr::V6(_) => AF_INET6,
        };

        let file_descriptor = unsafe { socket(domain, SOCK_STREAM, 0) };
        if file_descriptor < 0 {
            return Err(io::Error::last_os_error());
        }

        // Owned from here on so every early return closes it.
        let socket = Socket::from_raw(file_descriptor);
        socket.set_nonblocking()?;

        if options.reuse_address {
            socket.set_option(SOL_SOCKET, SO_REUSEADDR, 1)?;
        }

        if options.buffer_scale > 1 {
            scale_buffer(&socket, SO_RCVBUF, options.buffer_scale)?;
            scale_buffer(&socket, SO_SNDBUF, options.buffer_scale)?;
        }

        let (storage, length) = socketaddr_to_raw(address);
        let ret = unsafe {
            bind(
                file_descriptor,
                &storage as *const _ as *const sockaddr,
                length,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let ret = unsafe { listen(file_descriptor, options.backlog) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }

    /// Accepts one pending connection and makes it non-blocking.
    ///
    /// Returns an error of kind [`io::ErrorKind::WouldBlock`] when the backlog
    /// is empty.
    pub(crate) fn accept(&self) -> io::Result<Socket> {
        let client_file_descriptor = loop {
            let fd = unsafe { accept(self.as_raw_fd(), ptr::null_mut(), ptr::null_mut()) };
            if fd >= 0 {
                break fd;
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        let client = Socket::from_raw(client_file_descriptor);
        client.set_nonblocking()?;
        client.suppress_sigpipe()?;

        Ok(client)
    }

    /// The address the listener is actually bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

// Accepted sockets inherit the listener's buffer sizes.
fn scale_buffer(socket: &Socket, option: libc::c_int, scale: u32) -> io::Result<()> {
    let current = socket.get_option(SOL_SOCKET, option)?;
    let scaled = current.saturating_mul(scale.min(i32::MAX as u32) as i32);

    socket.set_option(SOL_SOCKET, option, scaled)
}
