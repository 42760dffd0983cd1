//! A reliable, connection-oriented byte-stream transport layered over an
//! unreliable datagram channel: three-way handshake, sliding-window
//! pipelined delivery with cumulative ACK and AIMD congestion control,
//! receiver flow control, and a four-way graceful close.

mod channel;
mod config;
mod connection;
mod error;
mod packet;

pub use channel::Channel;
pub use config::{
    ConnectionConfig, DEFAULT_INITIAL_SSTHRESH, DEFAULT_MSS, DEFAULT_N, DEFAULT_RECV_BUFFER,
};
pub use connection::{Chunk, Connection, State};
pub use error::Error;
pub use packet::{Flags, Packet};
