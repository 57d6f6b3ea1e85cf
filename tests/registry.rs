use iosock::{ClientRegistry, ConnectionHandle, RegistryError, Socket};
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;

fn socket_pair() -> (Socket, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
    let (accepted, _) = listener.accept().expect("accept");

    (Socket::from(accepted), client)
}

#[test]
fn create_then_lookup() {
    let registry = ClientRegistry::new();
    let (socket, client) = socket_pair();
    let handle = ConnectionHandle::from(socket.as_raw_fd());

    let connection = registry.create(handle, socket).expect("create");

    assert_eq!(connection.handle(), handle);
    assert_eq!(connection.peer_addr(), client.local_addr().ok());
    assert_eq!(connection.pending_bytes(), 0);
    assert!(registry.contains(handle));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.handles(), vec![handle]);
}

#[test]
fn remove_twice_is_a_no_op() {
    let registry = ClientRegistry::new();
    let (socket, _client) = socket_pair();
    let handle = ConnectionHandle::from(socket.as_raw_fd());
    registry.create(handle, socket).expect("create");

    assert!(registry.remove(handle).is_some());
    assert!(registry.remove(handle).is_none());
    assert!(registry.is_empty());
    assert!(registry.get(handle).is_none());
}

#[test]
fn remove_of_unknown_handle_is_a_no_op() {
    let registry = ClientRegistry::new();

    assert!(registry.remove(ConnectionHandle::from(12_345)).is_none());
    assert!(registry.is_empty());
}

#[test]
fn duplicate_handle_is_rejected() {
    let registry = ClientRegistry::new();
    let (socket, _first) = socket_pair();
    let (other, _second) = socket_pair();
    let handle = ConnectionHandle::from(socket.as_raw_fd());

    let original = registry.create(handle, socket).expect("create");

    assert_eq!(
        registry.create(handle, other).err(),
        Some(RegistryError::Duplicate(handle))
    );
    assert_eq!(registry.len(), 1);
    assert!(std::sync::Arc::ptr_eq(
        &original,
        &registry.get(handle).expect("still registered")
    ));
}

#[test]
fn drain_empties_the_registry() {
    let registry = ClientRegistry::new();
    let mut clients = Vec::new();

    for _ in 0..3 {
        let (socket, client) = socket_pair();
        let handle = ConnectionHandle::from(socket.as_raw_fd());
        registry.create(handle, socket).expect("create");
        clients.push(client);
    }

    assert_eq!(registry.drain().len(), 3);
    assert!(registry.is_empty());
}
