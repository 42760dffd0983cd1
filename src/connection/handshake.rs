//! Three-way handshake: active open (`connect`) and passive open (`accept`).
//! Grounded in `original_source`'s `client_connect`/`server_accept`
//! (`rdt.py`), generalized with the congestion/flow-control state the
//! teacher's `TCB::syn_sent`/`TCB::listen` initialize.

use std::collections::{BTreeMap, VecDeque};
use std::net::{SocketAddr, ToSocketAddrs};

use rand::rngs::StdRng;
use rand::Rng;

use crate::channel::Channel;
use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::packet::{Flags, Packet};

use super::{Connection, State};

const RECV_BUF_BYTES: usize = 4096;

impl Connection<StdRng> {
    /// Active open. Binds a channel, sends SYN, and retries up to
    /// `config.handshake_max_retries` times until a matching SYN+ACK
    /// arrives, then completes the handshake with a final ACK.
    pub fn connect(
        local_addr: impl ToSocketAddrs,
        remote_addr: SocketAddr,
        config: ConnectionConfig,
    ) -> Result<Connection<StdRng>, Error> {
        let mut channel = Channel::bind(local_addr, config.drop_prob, config.corrupt_prob)?;
        channel.set_timeout(Some(config.handshake_timeout))?;

        let mut rng = rand::thread_rng();
        let conn_id: u32 = rng.gen();
        let send_isn: u32 = rng.gen_range(0..1_000_000_000);

        let syn = Packet::new(conn_id, send_isn, 0, Flags::syn(), 0, Vec::new());

        for attempt in 0..config.handshake_max_retries {
            tracing::debug!(attempt, conn_id, send_isn, "sending SYN");
            channel.send(&syn.encode(), remote_addr)?;

            let (raw, from) = match channel.recv(RECV_BUF_BYTES) {
                Ok(v) => v,
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            };

            if from != remote_addr {
                continue;
            }

            let packet = match Packet::decode(&raw) {
                Ok(p) => p,
                Err(_) => continue,
            };

            if packet.conn_id != conn_id {
                continue;
            }

            if packet.flags.syn && packet.flags.ack && packet.ack == send_isn.wrapping_add(1) {
                let recv_isn = packet.seq;
                let recv_seq = recv_isn.wrapping_add(1);
                let send_seq = send_isn.wrapping_add(1);

                tracing::info!(conn_id, recv_isn, "handshake established (active open)");

                let mut conn = established(channel, remote_addr, conn_id, config, send_seq, recv_seq);

                let ack = Packet::new(
                    conn_id,
                    send_seq,
                    recv_seq,
                    Flags::ack(),
                    conn.available_recv_window(),
                    Vec::new(),
                );
                conn.channel.send(&ack.encode(), remote_addr)?;

                return Ok(conn);
            }

            tracing::trace!("unexpected packet during handshake, retrying");
        }

        Err(Error::HandshakeFailed)
    }

    /// Passive open. Listens indefinitely for a SYN, replies with SYN+ACK,
    /// then waits for the final ACK. A mismatched or absent final ACK
    /// returns to the top-level listen loop rather than failing.
    pub fn accept(
        local_addr: impl ToSocketAddrs,
        config: ConnectionConfig,
    ) -> Result<Connection<StdRng>, Error> {
        let mut channel = Channel::bind(local_addr, config.drop_prob, config.corrupt_prob)?;
        channel.set_timeout(Some(config.handshake_timeout))?;

        let mut rng = rand::thread_rng();

        loop {
            let (raw, from) = match channel.recv(RECV_BUF_BYTES) {
                Ok(v) => v,
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            };

            let packet = match Packet::decode(&raw) {
                Ok(p) => p,
                Err(_) => continue,
            };

            if !(packet.flags.syn && !packet.flags.ack) {
                tracing::trace!("non-SYN packet in LISTEN state, ignoring");
                continue;
            }

            let client_isn = packet.seq;
            let conn_id = packet.conn_id;
            let server_isn: u32 = rng.gen_range(0..1_000_000_000);
            let recv_seq = client_isn.wrapping_add(1);

            tracing::debug!(conn_id, client_isn, %from, "received SYN");

            let synack = Packet::new(conn_id, server_isn, recv_seq, Flags::syn_ack(), 0, Vec::new());
            channel.send(&synack.encode(), from)?;

            let (raw2, from2) = match channel.recv(RECV_BUF_BYTES) {
                Ok(v) => v,
                Err(Error::Timeout) => {
                    tracing::debug!("timed out waiting for final ACK, back to LISTEN");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if from2 != from {
                continue;
            }

            let ack_packet = match Packet::decode(&raw2) {
                Ok(p) => p,
                Err(_) => continue,
            };

            if ack_packet.conn_id != conn_id {
                continue;
            }

            if ack_packet.flags.ack
                && !ack_packet.flags.syn
                && ack_packet.ack == server_isn.wrapping_add(1)
            {
                let send_seq = server_isn.wrapping_add(1);

                tracing::info!(conn_id, %from, "handshake established (passive open)");

                return Ok(established(channel, from, conn_id, config, send_seq, recv_seq));
            }

            tracing::trace!("unexpected packet while awaiting final ACK, ignoring");
        }
    }
}

fn established(
    channel: Channel<StdRng>,
    remote_addr: SocketAddr,
    conn_id: u32,
    config: ConnectionConfig,
    send_seq: u32,
    recv_seq: u32,
) -> Connection<StdRng> {
    Connection {
        channel,
        remote_addr,
        conn_id,
        state: State::Established,
        config,

        base: send_seq,
        next_seq: send_seq,
        unacked: BTreeMap::new(),

        peer_rwnd: None,

        cwnd: config.mss,
        ssthresh: config.initial_ssthresh,
        dup_ack_count: 0,
        last_acked: send_seq,

        recv_seq,
        recv_buffered: 0,
        recv_queue: VecDeque::new(),
        fin_received: false,
    }
}
