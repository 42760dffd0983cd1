//! The per-connection transport state machine: handshake, send pipeline
//! (window/ACK/retransmission/congestion), receive pipeline
//! (reassembly/flow advertisement), and teardown.
//!
//! One state struct per connection, mutated only by the thread that calls
//! `send`/`receive`/`close` — no background tasks, no locks.

mod close;
mod handshake;
mod receive;
mod send;

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::RngCore;

use crate::channel::Channel;
use crate::config::ConnectionConfig;

/// Connection lifecycle state, per the three-way-handshake / four-way-close
/// state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Listen,
    SynSent,
    SynRcvd,
    Established,
    CloseWait,
    FinWait,
    Closed,
}

/// A chunk of in-order payload bytes returned by `receive`, the timeout
/// sentinel when no datagram arrived in time, or the end-of-stream sentinel
/// once the peer's FIN has been seen and the queue has drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    TimedOut,
    EndOfStream,
}

/// A segment recorded in the send-side retransmission buffer: its encoded
/// bytes (ready to retransmit verbatim) and its payload length in bytes.
pub(crate) struct UnackedSegment {
    pub(crate) encoded: Vec<u8>,
    pub(crate) len: u32,
}

pub struct Connection<R: RngCore = StdRng> {
    pub(crate) channel: Channel<R>,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) conn_id: u32,
    pub(crate) state: State,
    pub(crate) config: ConnectionConfig,

    // Send side.
    pub(crate) base: u32,
    pub(crate) next_seq: u32,
    pub(crate) unacked: BTreeMap<u32, UnackedSegment>,

    // Flow control.
    pub(crate) peer_rwnd: Option<u32>,

    // Congestion control.
    pub(crate) cwnd: u32,
    pub(crate) ssthresh: u32,
    pub(crate) dup_ack_count: u32,
    pub(crate) last_acked: u32,

    // Receive side.
    pub(crate) recv_seq: u32,
    pub(crate) recv_buffered: u32,
    pub(crate) recv_queue: VecDeque<Vec<u8>>,
    pub(crate) fin_received: bool,
}

/// Sequence-number comparison that accounts for wraparound: `true` iff `a`
/// precedes `b` on the 32-bit sequence circle.
pub(crate) fn wrapping_lt(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) > 0
}

impl<R: RngCore> Connection<R> {
    /// `min(N * mss, peer_rwnd, cwnd)`, the cap on bytes in flight that
    /// bounds how far the send window may be filled. `peer_rwnd` of `None`
    /// (no ACK seen yet) does not constrain the window.
    pub(crate) fn effective_window(&self) -> u32 {
        let mut window = self.config.n * self.config.mss;
        window = window.min(self.cwnd);
        if let Some(peer_rwnd) = self.peer_rwnd {
            window = window.min(peer_rwnd);
        }
        window
    }

    /// Free space in the receiver's buffer: the cap advertised to the peer
    /// in every outgoing packet's `rwnd` field.
    pub fn available_recv_window(&self) -> u32 {
        self.config.recv_buffer_capacity - self.recv_buffered
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}
