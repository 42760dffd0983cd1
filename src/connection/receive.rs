//! Receive pipeline: in-order delivery, cumulative ACK generation, receiver
//! flow control, and FIN detection. Grounded in `original_source`'s receiver
//! loop (`rdt.py`'s `recv`), which accepts only the next expected sequence
//! number and otherwise just re-acknowledges what it already has.

use std::time::Duration;

use rand::rngs::StdRng;

use crate::error::Error;
use crate::packet::{Flags, Packet};

use super::{Chunk, Connection};

const RECV_BUF_BYTES: usize = 4096;

impl Connection<StdRng> {
    /// Return the next chunk of in-order payload bytes, `Chunk::TimedOut` if
    /// nothing arrived within `timeout`, or `Chunk::EndOfStream` once the
    /// peer's FIN has been seen and all buffered data has been drained.
    pub fn receive(&mut self, timeout: Duration) -> Result<Chunk, Error> {
        if let Some(chunk) = self.drain_one()? {
            return Ok(chunk);
        }
        if self.fin_received {
            return Ok(Chunk::EndOfStream);
        }

        self.channel.set_timeout(Some(timeout))?;

        loop {
            let (raw, from) = match self.channel.recv(RECV_BUF_BYTES) {
                Ok(v) => v,
                Err(Error::Timeout) => return Ok(Chunk::TimedOut),
                Err(e) => return Err(e),
            };

            if from != self.remote_addr {
                continue;
            }

            let packet = match Packet::decode(&raw) {
                Ok(p) => p,
                Err(_) => {
                    tracing::trace!("dropped malformed datagram");
                    continue;
                }
            };

            if packet.conn_id != self.conn_id {
                continue;
            }

            if packet.flags.fin {
                self.handle_fin(&packet)?;
            } else if packet.flags.data {
                self.handle_data(&packet)?;
            } else {
                continue;
            }

            if let Some(chunk) = self.drain_one()? {
                return Ok(chunk);
            }
            if self.fin_received {
                return Ok(Chunk::EndOfStream);
            }
        }
    }

    /// Pop the head of `recv_queue`, if any, and advertise the space it frees
    /// with an unsolicited window-update ACK — otherwise a peer stalled at a
    /// zero `rwnd` has nothing telling it the buffer has room again.
    fn drain_one(&mut self) -> Result<Option<Chunk>, Error> {
        let Some(chunk) = self.recv_queue.pop_front() else {
            return Ok(None);
        };
        self.recv_buffered -= chunk.len() as u32;
        self.send_ack()?;
        Ok(Some(Chunk::Data(chunk)))
    }

    /// Accept an in-order data segment into the buffer and advance the
    /// expected sequence number, or re-acknowledge what's already held if
    /// the segment is a duplicate/out-of-order or the buffer is full.
    fn handle_data(&mut self, packet: &Packet) -> Result<(), Error> {
        if packet.seq == self.recv_seq {
            let len = packet.payload.len() as u32;
            if self.available_recv_window() >= len {
                tracing::trace!(seq = packet.seq, len, "accepted in-order segment");
                self.recv_queue.push_back(packet.payload.clone());
                self.recv_buffered += len;
                self.recv_seq = self.recv_seq.wrapping_add(len);
            } else {
                tracing::debug!(seq = packet.seq, len, "dropping segment, receive buffer full");
            }
        } else {
            tracing::trace!(seq = packet.seq, expected = self.recv_seq, "dropping out-of-order segment");
        }

        self.send_ack()
    }

    /// Consume a FIN at the expected sequence position and mark the stream
    /// as ended once any already-buffered data has been read by the caller.
    pub(crate) fn handle_fin(&mut self, packet: &Packet) -> Result<(), Error> {
        if packet.seq == self.recv_seq {
            tracing::debug!(seq = packet.seq, "received FIN");
            self.recv_seq = self.recv_seq.wrapping_add(1);
            self.fin_received = true;
        }
        self.send_ack()
    }

    pub(crate) fn send_ack(&mut self) -> Result<(), Error> {
        let ack = Packet::new(
            self.conn_id,
            self.next_seq,
            self.recv_seq,
            Flags::ack(),
            self.available_recv_window(),
            Vec::new(),
        );
        self.channel.send(&ack.encode(), self.remote_addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, VecDeque};
    use std::net::SocketAddr;

    fn test_connection() -> Connection<StdRng> {
        let channel = crate::channel::Channel::bind_with_rng(
            "127.0.0.1:0",
            0.0,
            0.0,
            StdRng::seed_from_u64(11),
        )
        .unwrap();
        let remote_addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let config = ConnectionConfig::default();
        Connection {
            channel,
            remote_addr,
            conn_id: 1,
            state: super::super::State::Established,
            config,
            base: 0,
            next_seq: 0,
            unacked: BTreeMap::new(),
            peer_rwnd: None,
            cwnd: config.mss,
            ssthresh: config.initial_ssthresh,
            dup_ack_count: 0,
            last_acked: 0,
            recv_seq: 0,
            recv_buffered: 0,
            recv_queue: VecDeque::new(),
            fin_received: false,
        }
    }

    #[test]
    fn accepts_in_order_segment_and_advances_recv_seq() {
        let mut conn = test_connection();
        let packet = Packet::new(99, 0, 0, Flags::data(), 0, b"hi".to_vec());

        conn.handle_data(&packet).unwrap();

        assert_eq!(conn.recv_seq, 2);
        assert_eq!(conn.recv_buffered, 2);
        assert_eq!(conn.drain_one().unwrap(), Some(Chunk::Data(b"hi".to_vec())));
    }

    #[test]
    fn drops_out_of_order_segment_without_buffering() {
        let mut conn = test_connection();
        let packet = Packet::new(99, 0, 50, Flags::data(), 0, b"late".to_vec());

        conn.handle_data(&packet).unwrap();

        assert_eq!(conn.recv_seq, 0);
        assert_eq!(conn.recv_buffered, 0);
        assert!(conn.recv_queue.is_empty());
    }

    #[test]
    fn draining_a_chunk_sends_a_window_update_ack() {
        let peer = crate::channel::Channel::bind_with_rng(
            "127.0.0.1:0",
            0.0,
            0.0,
            StdRng::seed_from_u64(12),
        )
        .unwrap();
        let mut peer = peer;
        let peer_addr = peer.local_addr().unwrap();
        peer.set_timeout(Some(std::time::Duration::from_millis(200))).unwrap();

        let mut conn = test_connection();
        conn.remote_addr = peer_addr;

        let packet = Packet::new(99, 0, 0, Flags::data(), 0, b"hi".to_vec());
        conn.handle_data(&packet).unwrap();
        // Drain the ACK `handle_data` already sent before asserting on the
        // one `drain_one` is expected to send.
        peer.recv(4096).unwrap();

        conn.drain_one().unwrap();

        let (raw, _) = peer.recv(4096).unwrap();
        let ack = Packet::decode(&raw).unwrap();
        assert!(ack.flags.ack);
        assert_eq!(ack.rwnd, conn.available_recv_window());
    }

    #[test]
    fn fin_at_expected_sequence_marks_end_of_stream() {
        let mut conn = test_connection();
        let packet = Packet::new(99, 0, 0, Flags::fin(), 0, Vec::new());

        conn.handle_fin(&packet).unwrap();

        assert!(conn.fin_received);
        assert_eq!(conn.recv_seq, 1);
    }
}
