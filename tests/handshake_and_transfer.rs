//! End-to-end scenarios over real loopback UDP sockets: clean handshake,
//! bulk transfer, and graceful close. Mirrors the scenarios enumerated in
//! the design notes rather than mocking the channel.

use std::thread;
use std::time::Duration;

use rdt::{Chunk, Connection, ConnectionConfig};

const SERVER_ADDR: &str = "127.0.0.1:18273";

#[test]
fn clean_handshake_bulk_transfer_and_graceful_close() {
    let server = thread::spawn(|| {
        let config = ConnectionConfig::default();
        let mut conn = Connection::accept(SERVER_ADDR, config).unwrap();

        let mut received = Vec::new();
        loop {
            match conn.receive(Duration::from_secs(2)).unwrap() {
                Chunk::Data(bytes) => received.extend_from_slice(&bytes),
                Chunk::TimedOut => continue,
                Chunk::EndOfStream => break,
            }
        }
        conn.close().unwrap();
        received
    });

    // `accept` retries internally, so a client dialing before the server's
    // socket is bound just sees its early SYNs go unanswered and retransmits.
    thread::sleep(Duration::from_millis(50));

    let client = thread::spawn(|| {
        let config = ConnectionConfig::default();
        let remote_addr = SERVER_ADDR.parse().unwrap();
        let mut conn = Connection::connect("127.0.0.1:0", remote_addr, config).unwrap();

        let payload = b"x".repeat(4096);
        conn.send(&payload).unwrap();
        conn.close().unwrap();
        payload
    });

    let sent = client.join().unwrap();
    let received = server.join().unwrap();

    assert_eq!(sent, received);
}
