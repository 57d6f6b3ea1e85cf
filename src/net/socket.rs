//! Owned, non-blocking stream socket.
//!
//! [`Socket`] owns one descriptor and closes it on drop. Every other part of
//! the crate borrows it, so the descriptor number stays reserved for as long
//! as any worker still holds the connection it belongs to.

use crate::net::utils::raw_to_socketaddr;

use libc::{F_GETFL, F_SETFL, O_NONBLOCK, SHUT_RDWR, close, fcntl, sockaddr, sockaddr_storage};
use std::io;
use std::mem;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// An owned stream socket descriptor.
#[derive(Debug)]
pub struct Socket {
    file_descriptor: RawFd,
}

impl Socket {
    /// Takes ownership of `file_descriptor`.
    ///
    /// The caller must not close the descriptor afterwards.
    pub(crate) fn from_raw(file_descriptor: RawFd) -> Self {
        Self { file_descriptor }
    }

    /// Switches the descriptor to non-blocking mode.
    pub fn set_nonblocking(&self) -> io::Result<()> {
        let flags = unsafe { fcntl(self.file_descriptor, F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }

        let ret = unsafe { fcntl(self.file_descriptor, F_SETFL, flags | O_NONBLOCK) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Stops writes to a dead peer from raising `SIGPIPE` on platforms without
    /// `MSG_NOSIGNAL`.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub(crate) fn suppress_sigpipe(&self) -> io::Result<()> {
        self.set_option(libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1)
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    pub(crate) fn suppress_sigpipe(&self) -> io::Result<()> {
        Ok(())
    }

    pub(crate) fn set_option(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: libc::c_int,
    ) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.file_descriptor,
                level,
                name,
                &value as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };

        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    pub(crate) fn get_option(&self, level: libc::c_int, name: libc::c_int) -> io::Result<libc::c_int> {
        let mut value: libc::c_int = 0;
        let mut length = mem::size_of::<libc::c_int>() as libc::socklen_t;

        let ret = unsafe {
            libc::getsockopt(
                self.file_descriptor,
                level,
                name,
                &mut value as *mut libc::c_int as *mut libc::c_void,
                &mut length,
            )
        };

        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(value)
    }

    /// Reads whatever is available into `buf`.
    ///
    /// `Ok(0)` means the peer closed its write side. A socket with nothing to
    /// read yields an error of kind [`io::ErrorKind::WouldBlock`].
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let res = unsafe {
                libc::recv(
                    self.file_descriptor,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };

            if res >= 0 {
                return Ok(res as usize);
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Writes as much of `buf` as the kernel accepts right now.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let res = unsafe {
                libc::send(
                    self.file_descriptor,
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                    SEND_FLAGS,
                )
            };

            if res >= 0 {
                return Ok(res as usize);
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Half-closes both directions. The descriptor itself stays open until drop.
    pub fn shutdown(&self) -> io::Result<()> {
        let ret = unsafe { libc::shutdown(self.file_descriptor, SHUT_RDWR) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as libc::socklen_t;

        let ret = unsafe {
            libc::getpeername(
                self.file_descriptor,
                &mut storage as *mut sockaddr_storage as *mut sockaddr,
                &mut length,
            )
        };

        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        raw_to_socketaddr(&storage)
    }

    /// Address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as libc::socklen_t;

        let ret = unsafe {
            libc::getsockname(
                self.file_descriptor,
                &mut storage as *mut sockaddr_storage as *mut sockaddr,
                &mut length,
            )
        };

        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        raw_to_socketaddr(&storage)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.file_descriptor
    }
}

impl From<TcpStream> for Socket {
    fn from(stream: TcpStream) -> Self {
        Self::from_raw(stream.into_raw_fd())
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        unsafe {
            close(self.file_descriptor);
        }
    }
}
