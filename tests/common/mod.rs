#![allow(dead_code)]

use iosock::{ConnectionHandle, Server, ServerBuilder, ServerEvent};
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Starts a server on an ephemeral loopback port.
pub fn start(builder: ServerBuilder) -> (Server, SocketAddr) {
    init_tracing();

    let server = builder.bind("127.0.0.1", 0).build();
    server.start_with_config().expect("start server");
    let addr = server.local_addr().expect("bound address");

    (server, addr)
}

pub fn start_default() -> (Server, SocketAddr) {
    start(Server::builder())
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(TIMEOUT)).expect("read timeout");
    stream
}

pub fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).expect("read_exact");
    buf
}

/// Reads until the peer closes. Panics if it stays open past the read timeout.
pub fn read_to_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).expect("read until eof");
    buf
}

/// Collects payload bytes until `len` bytes arrived, returning the handle
/// they arrived on.
pub fn receive_bytes(server: &Server, len: usize) -> (ConnectionHandle, Vec<u8>) {
    let deadline = Instant::now() + TIMEOUT;
    let mut handle = None;
    let mut data = Vec::with_capacity(len);

    while data.len() < len {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let message = server
            .receive_timeout(remaining)
            .expect("message before timeout");

        if let Some(handle) = handle {
            assert_eq!(message.handle, handle, "bytes from another connection");
        }
        handle = Some(message.handle);
        data.extend_from_slice(&message.payload);
    }

    (handle.expect("at least one message"), data)
}

pub fn next_event(server: &Server) -> ServerEvent {
    server.next_event_timeout(TIMEOUT).expect("event before timeout")
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }

    condition()
}

/// Closes `stream` with a reset instead of an orderly shutdown.
pub fn reset(stream: TcpStream) {
    // Linger of zero turns the close into a reset.
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    assert_eq!(rc, 0, "SO_LINGER");
    drop(stream);
}
