//! Send pipeline: window-limited pipelined transmission, cumulative ACK
//! processing, AIMD congestion control, fast retransmit, and Go-Back-N
//! timeout retransmission. Grounded in `original_source`'s sender loop
//! (`rdt.py`'s `send`), generalized with AIMD congestion-window machinery.

use rand::rngs::StdRng;

use crate::error::Error;
use crate::packet::{Flags, Packet};

use super::{wrapping_lt, Connection, UnackedSegment};

const RECV_BUF_BYTES: usize = 4096;

impl Connection<StdRng> {
    /// Reliably deliver `payload` to the peer. Blocks until every byte has
    /// been cumulatively acknowledged.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
        if payload.is_empty() {
            return Ok(());
        }

        let start_seq = self.next_seq;
        let end_seq = start_seq.wrapping_add(payload.len() as u32);

        self.channel.set_timeout(Some(self.config.send_timeout))?;
        let mut retries = 0u32;

        while self.base != end_seq {
            self.fill_window(payload, start_seq, end_seq)?;

            match self.channel.recv(RECV_BUF_BYTES) {
                Ok((raw, from)) => {
                    if from != self.remote_addr {
                        continue;
                    }
                    let packet = match Packet::decode(&raw) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    if packet.conn_id != self.conn_id || !packet.flags.ack {
                        continue;
                    }

                    self.peer_rwnd = Some(packet.rwnd);
                    self.on_ack(packet.ack)?;
                    retries = 0;
                }
                Err(Error::Timeout) => {
                    retries += 1;
                    if retries > self.config.send_max_retries {
                        return Err(Error::DeliveryFailed);
                    }
                    tracing::debug!(retries, base = self.base, "send timed out, retransmitting");
                    self.on_timeout();
                    self.retransmit_from_base()?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Push segments onto the wire until the effective window is exhausted
    /// or `payload` is fully queued, recording each in the retransmission
    /// buffer. Each segment's length is `min(end_seq - next_seq, edge -
    /// next_seq, mss)` against the *live* window — recomputed every
    /// iteration, not carved out of fixed `mss` chunks up front — so a
    /// window with less than one full `mss` of room still makes progress
    /// with a shorter segment instead of stalling.
    fn fill_window(&mut self, payload: &[u8], start_seq: u32, end_seq: u32) -> Result<(), Error> {
        let mss = self.config.mss;

        while self.next_seq != end_seq {
            let in_flight = self.next_seq.wrapping_sub(self.base);
            let room = self.effective_window().saturating_sub(in_flight);
            if room == 0 {
                break;
            }

            let remaining = end_seq.wrapping_sub(self.next_seq);
            let seg_len = remaining.min(room).min(mss);
            if seg_len == 0 {
                break;
            }

            let offset = self.next_seq.wrapping_sub(start_seq) as usize;
            let seg = &payload[offset..offset + seg_len as usize];

            let seq = self.next_seq;
            let packet = Packet::new(
                self.conn_id,
                seq,
                self.recv_seq,
                Flags::data(),
                self.available_recv_window(),
                seg.to_vec(),
            );
            let encoded = packet.encode();

            tracing::trace!(seq, len = seg.len(), "sending data segment");
            self.channel.send(&encoded, self.remote_addr)?;

            self.unacked.insert(seq, UnackedSegment { encoded, len: seg_len });
            self.next_seq = self.next_seq.wrapping_add(seg_len);
        }
        Ok(())
    }

    /// Resend every currently-outstanding segment, in sequence order, per
    /// Go-Back-N: a timeout retransmits the whole window, not just the
    /// oldest segment.
    fn retransmit_from_base(&mut self) -> Result<(), Error> {
        for segment in self.unacked.values() {
            self.channel.send(&segment.encoded, self.remote_addr)?;
        }
        Ok(())
    }

    /// Process a received cumulative ACK: retire acknowledged segments,
    /// advance `base`, and drive AIMD / fast retransmit.
    fn on_ack(&mut self, ack: u32) -> Result<(), Error> {
        let mss = self.config.mss;

        if ack == self.last_acked {
            self.dup_ack_count += 1;
            tracing::trace!(ack, dup_ack_count = self.dup_ack_count, "duplicate ACK");

            if self.dup_ack_count == 3 {
                tracing::debug!(ack, "fast retransmit on triple duplicate ACK");
                self.ssthresh = (self.cwnd / 2).max(mss);
                self.cwnd = self.ssthresh;
                // dup_ack_count is deliberately not reset here: it only resets
                // once `base` advances on a new cumulative ACK.
                self.retransmit_from_base()?;
            }
            return Ok(());
        }

        if wrapping_lt(self.last_acked, ack) {
            self.unacked.retain(|&seq, _| !wrapping_lt(seq, ack));
            self.base = ack;
            self.last_acked = ack;
            self.dup_ack_count = 0;

            if self.cwnd < self.ssthresh {
                self.cwnd = self.cwnd.saturating_add(mss);
                tracing::trace!(cwnd = self.cwnd, "slow start growth");
            } else {
                let increment = (mss.saturating_mul(mss) / self.cwnd.max(1)).max(1);
                self.cwnd = self.cwnd.saturating_add(increment);
                tracing::trace!(cwnd = self.cwnd, "congestion avoidance growth");
            }
        }

        Ok(())
    }

    /// On a retransmission timeout: halve the window into `ssthresh`, drop
    /// `cwnd` back to one segment, per AIMD's multiplicative-decrease leg.
    fn on_timeout(&mut self) {
        let mss = self.config.mss;
        self.ssthresh = (self.cwnd / 2).max(mss);
        self.cwnd = mss;
        self.dup_ack_count = 0;
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
            StdRng::seed_from_u64(7),
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
    fn new_cumulative_ack_advances_base_and_grows_cwnd_in_slow_start() {
        let mut conn = test_connection();
        conn.unacked.insert(0, UnackedSegment { encoded: vec![0; 4], len: 100 });
        conn.next_seq = 100;

        conn.on_ack(100).unwrap();

        assert_eq!(conn.base, 100);
        assert_eq!(conn.last_acked, 100);
        assert!(conn.unacked.is_empty());
        assert_eq!(conn.cwnd, conn.config.mss * 2);
    }

    #[test]
    fn triple_duplicate_ack_triggers_fast_retransmit() {
        let mut conn = test_connection();
        conn.unacked.insert(0, UnackedSegment { encoded: vec![0; 4], len: 100 });
        conn.next_seq = 100;
        conn.last_acked = 0;

        conn.on_ack(0).unwrap();
        conn.on_ack(0).unwrap();
        conn.on_ack(0).unwrap();

        assert_eq!(conn.dup_ack_count, 3);
        assert_eq!(conn.cwnd, conn.ssthresh);
    }

    #[test]
    fn fill_window_sends_partial_segment_when_room_is_less_than_mss() {
        let mut conn = test_connection();
        conn.cwnd = 200;
        conn.peer_rwnd = Some(200);

        let payload = vec![7u8; 1000];
        let start_seq = conn.next_seq;
        let end_seq = start_seq.wrapping_add(payload.len() as u32);

        conn.fill_window(&payload, start_seq, end_seq).unwrap();

        assert_eq!(conn.next_seq, start_seq + 200);
        assert_eq!(conn.unacked.len(), 1);
        assert_eq!(conn.unacked.get(&start_seq).unwrap().len, 200);
    }

    #[test]
    fn timeout_halves_window_into_ssthresh() {
        let mut conn = test_connection();
        conn.cwnd = 2000;

        conn.on_timeout();

        assert_eq!(conn.ssthresh, 1000);
        assert_eq!(conn.cwnd, conn.config.mss);
    }
}
