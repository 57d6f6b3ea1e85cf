mod common;

use common::{
    connect, init_tracing, read_exactly, read_to_eof, receive_bytes, reset, start, start_default,
    wait_until,
};
use iosock::{ConnectionHandle, Error, LoopState, SendError, Server, ServerConfig};
use std::io::Write;
use std::time::Duration;

#[test]
fn stop_releases_blocked_receivers() {
    let (server, _addr) = start_default();

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| server.receive());

        std::thread::sleep(Duration::from_millis(50));
        server.stop().expect("stop");

        assert_eq!(waiter.join().expect("receiver thread"), None);
    });

    assert_eq!(server.receive(), None);
    assert_eq!(server.receive(), None);
    assert_eq!(server.try_receive(), None);
    assert_eq!(server.next_event(), None);
    assert_eq!(server.state(), LoopState::Stopped);
    assert_eq!(server.local_addr(), None);
}

#[test]
fn stop_closes_open_connections() {
    let (server, addr) = start_default();

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    receive_bytes(&server, 2);

    server.stop().expect("stop");

    assert!(read_to_eof(&mut client).is_empty());
    assert_eq!(server.connections(), 0);
}

#[test]
fn stop_and_join_without_start_are_no_ops() {
    init_tracing();
    let server = Server::new(ServerConfig::default());

    assert_eq!(server.state(), LoopState::Stopped);
    server.stop().expect("stop");
    server.join().expect("join");
}

#[test]
fn second_start_is_rejected() {
    let (server, _addr) = start_default();

    assert!(matches!(
        server.start("127.0.0.1", 0, 5),
        Err(Error::AlreadyRunning)
    ));
    assert_eq!(server.state(), LoopState::Running);

    server.stop().expect("stop");
}

#[test]
fn bind_conflict_is_reported() {
    let (first, addr) = start_default();
    let second = Server::new(ServerConfig::default());

    let result = second.start("127.0.0.1", addr.port(), 5);

    assert!(matches!(result, Err(Error::Bind { .. })), "{result:?}");
    assert_eq!(second.state(), LoopState::Stopped);

    first.stop().expect("stop");
}

#[test]
fn server_restarts_after_stop() {
    let (server, addr) = start_default();
    server.stop().expect("first stop");

    server.start("127.0.0.1", 0, 5).expect("restart");
    let restarted = server.local_addr().expect("bound again");
    assert_eq!(restarted.ip(), addr.ip());

    let mut client = connect(restarted);
    client.write_all(b"again").expect("write");
    let (handle, payload) = receive_bytes(&server, 5);
    server.send(handle, payload);

    assert_eq!(read_exactly(&mut client, 5), b"again");

    server.stop().expect("second stop");
}

#[test]
fn shutdown_client_closes_only_that_connection() {
    let (server, addr) = start_default();

    let mut closed = connect(addr);
    closed.write_all(b"a").expect("write");
    let (closed_handle, _) = receive_bytes(&server, 1);

    let mut open = connect(addr);
    open.write_all(b"b").expect("write");
    let (open_handle, _) = receive_bytes(&server, 1);

    assert!(server.shutdown_client(closed_handle));
    assert!(read_to_eof(&mut closed).is_empty());
    assert!(wait_until(|| !server.is_connected(closed_handle)));

    server.send(open_handle, b"still here".to_vec());
    assert_eq!(read_exactly(&mut open, 10), b"still here");

    assert!(!server.shutdown_client(ConnectionHandle::from(999_999)));

    server.stop().expect("stop");
}

#[test]
fn outbound_limit_rejects_and_disconnects() {
    let (server, addr) = start(Server::builder().max_outbound_bytes(Some(16)));

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    let (handle, _) = receive_bytes(&server, 2);

    assert_eq!(
        server.try_send(handle, vec![0u8; 32]),
        Err(SendError::OutboundLimit { handle, limit: 16 })
    );

    read_to_eof(&mut client);
    assert!(wait_until(|| !server.is_connected(handle)));

    server.stop().expect("stop");
}

#[test]
fn rejected_sends_report_why() {
    let (server, addr) = start_default();

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    let (handle, _) = receive_bytes(&server, 2);

    assert_eq!(server.try_send(handle, Vec::new()), Err(SendError::Empty));

    let unknown = ConnectionHandle::from(999_999);
    assert_eq!(
        server.try_send(unknown, b"x".to_vec()),
        Err(SendError::UnknownHandle(unknown))
    );
    assert_eq!(server.pending_bytes(unknown), None);

    server.stop().expect("stop");
}

#[test]
fn reset_connection_does_not_disturb_others() {
    let (server, addr) = start_default();

    let mut doomed = connect(addr);
    doomed.write_all(b"a").expect("write");
    let (doomed_handle, _) = receive_bytes(&server, 1);

    let mut healthy = connect(addr);
    healthy.write_all(b"b").expect("write");
    let (healthy_handle, _) = receive_bytes(&server, 1);

    reset(doomed);

    assert!(wait_until(|| !server.is_connected(doomed_handle)));
    server.send(doomed_handle, b"lost".to_vec());

    healthy.write_all(b"after").expect("write");
    let (handle, payload) = receive_bytes(&server, 5);
    assert_eq!(handle, healthy_handle);
    assert_eq!(payload, b"after");

    server.send(healthy_handle, b"pong".to_vec());
    assert_eq!(read_exactly(&mut healthy, 4), b"pong");

    server.stop().expect("stop");
}

#[test]
fn reset_peer_with_queued_data_is_torn_down() {
    let (server, addr) = start(Server::builder().max_outbound_bytes(None));

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    let (handle, _) = receive_bytes(&server, 2);

    for _ in 0..32 {
        server.send(handle, vec![0u8; 512 * 1024]);
    }
    assert!(server.pending_bytes(handle).is_some_and(|bytes| bytes > 0));

    reset(client);

    // The queue is dropped, and later sends are refused rather than queued.
    assert!(wait_until(|| matches!(
        server.try_send(handle, b"x".to_vec()),
        Err(SendError::Closed(_)) | Err(SendError::UnknownHandle(_))
    )));
    assert!(wait_until(|| !server.is_connected(handle)));
    assert_eq!(server.pending_bytes(handle), None);

    server.stop().expect("stop");
}
