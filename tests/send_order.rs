mod common;

use common::{connect, read_exactly, receive_bytes, start_default, wait_until};
use proptest::prelude::*;
use std::io::Write;
use std::thread;
use std::time::Duration;

#[test]
fn large_send_arrives_whole() {
    let (server, addr) = start_default();

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    let (handle, _) = receive_bytes(&server, 2);

    server.send(handle, vec![b'A'; 20_000]);

    let received = read_exactly(&mut client, 20_000);
    assert!(received.iter().all(|&byte| byte == b'A'));

    server.stop().expect("stop");
}

#[test]
fn slow_reader_gets_every_byte() {
    let (server, addr) = start_default();

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    let (handle, _) = receive_bytes(&server, 2);

    let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 253) as u8).collect();
    for chunk in payload.chunks(256 * 1024) {
        server.try_send(handle, chunk.to_vec()).expect("queue chunk");
    }

    // Let the kernel buffers fill so the sender has to back off.
    thread::sleep(Duration::from_millis(200));
    assert!(server.pending_bytes(handle).is_some());

    let received = read_exactly(&mut client, payload.len());
    assert_eq!(received, payload);

    assert!(wait_until(|| server.pending_bytes(handle) == Some(0)));

    server.stop().expect("stop");
}

#[test]
fn sends_from_many_threads_keep_each_buffer_intact() {
    let (server, addr) = start_default();

    let mut client = connect(addr);
    client.write_all(b"hi").expect("write");
    let (handle, _) = receive_bytes(&server, 2);

    thread::scope(|scope| {
        for byte in [b'a', b'b', b'c', b'd'] {
            let server = &server;
            scope.spawn(move || {
                for _ in 0..16 {
                    server.send(handle, vec![byte; 1024]);
                }
            });
        }
    });

    let received = read_exactly(&mut client, 4 * 16 * 1024);
    for block in received.chunks(1024) {
        assert!(block.iter().all(|&byte| byte == block[0]), "interleaved buffer");
    }

    server.stop().expect("stop");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn sends_reach_the_peer_in_call_order(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..4096), 1..24)
    ) {
        let (server, addr) = start_default();

        let mut client = connect(addr);
        client.write_all(b"hi").expect("write");
        let (handle, _) = receive_bytes(&server, 2);

        let expected: Vec<u8> = chunks.concat();
        for chunk in chunks {
            server.send(handle, chunk);
        }

        let received = read_exactly(&mut client, expected.len());
        prop_assert_eq!(received, expected);

        server.stop().expect("stop");
    }
}
