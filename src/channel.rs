//! A best-effort, message-oriented datagram channel with injected loss and
//! corruption, bound to a local UDP socket. Grounded in `original_source`'s
//! `UnreliableChannel` (`channel.py`), which wraps a plain `SOCK_DGRAM`
//! socket the same way.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::error::Error;

const DEFAULT_RECV_BYTES: usize = 4096;

/// Channel generic over its randomness source, so test harnesses can inject
/// a deterministic RNG while production code defaults to OS entropy.
pub struct Channel<R: RngCore = StdRng> {
    socket: UdpSocket,
    drop_prob: f64,
    corrupt_prob: f64,
    rng: R,
}

impl Channel<StdRng> {
    /// Bind a new channel seeded from OS entropy.
    pub fn bind(
        local_addr: impl ToSocketAddrs,
        drop_prob: f64,
        corrupt_prob: f64,
    ) -> Result<Self, Error> {
        Self::bind_with_rng(local_addr, drop_prob, corrupt_prob, StdRng::from_entropy())
    }
}

impl<R: RngCore> Channel<R> {
    /// Bind a new channel with an explicit RNG, for deterministic tests.
    pub fn bind_with_rng(
        local_addr: impl ToSocketAddrs,
        drop_prob: f64,
        corrupt_prob: f64,
        rng: R,
    ) -> Result<Self, Error> {
        let socket = UdpSocket::bind(local_addr)?;
        Ok(Channel { socket, drop_prob, corrupt_prob, rng })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send `bytes` to `remote_addr`, independently dropping or corrupting
    /// the datagram per the configured probabilities before it hits the
    /// wire. Returns the number of bytes handed to the OS socket (0 if the
    /// datagram was dropped).
    pub fn send(&mut self, bytes: &[u8], remote_addr: SocketAddr) -> Result<usize, Error> {
        let r: f64 = self.rng.gen();

        if r < self.drop_prob {
            tracing::trace!(%remote_addr, len = bytes.len(), "channel dropped outbound datagram");
            return Ok(0);
        }

        let outbound = if r < self.drop_prob + self.corrupt_prob && !bytes.is_empty() {
            let mut corrupted = bytes.to_vec();
            let idx = self.rng.gen_range(0..corrupted.len());
            corrupted[idx] ^= 0xFF;
            tracing::trace!(%remote_addr, idx, "channel corrupted outbound datagram");
            corrupted
        } else {
            bytes.to_vec()
        };

        Ok(self.socket.send_to(&outbound, remote_addr)?)
    }

    /// Receive the next datagram, blocking up to the configured timeout.
    /// Signals `Error::Timeout` on expiry rather than a raw I/O error.
    pub fn recv(&mut self, max_bytes: usize) -> Result<(Vec<u8>, SocketAddr), Error> {
        let mut buf = vec![0u8; max_bytes.max(DEFAULT_RECV_BYTES)];
        match self.socket.recv_from(&mut buf) {
            Ok((n, addr)) => {
                buf.truncate(n);
                Ok((buf, addr))
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(Error::Timeout)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn close(self) {
        drop(self);
    }
}
