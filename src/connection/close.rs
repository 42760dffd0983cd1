//! Four-way graceful close: each direction's FIN is acknowledged
//! independently, so either peer may still be flushing inbound data when it
//! sends its own FIN. Grounded in `original_source`'s `rdt.py` close
//! handshake, with FIN-WAIT/CLOSE-WAIT
//! state naming matching the RFC 9293 state diagram.

use rand::rngs::StdRng;

use crate::error::Error;
use crate::packet::{Flags, Packet};

use super::{Connection, State};

const RECV_BUF_BYTES: usize = 4096;

impl Connection<StdRng> {
    /// Initiate (or complete) a graceful close: send a FIN, retry until it's
    /// acknowledged, and keep servicing the peer's own FIN/ACK until both
    /// directions have closed.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.state == State::Closed {
            return Ok(());
        }

        self.channel.set_timeout(Some(self.config.close_timeout))?;

        let fin_seq = self.next_seq;
        let fin = Packet::new(
            self.conn_id,
            fin_seq,
            self.recv_seq,
            Flags::fin(),
            self.available_recv_window(),
            Vec::new(),
        );
        self.next_seq = self.next_seq.wrapping_add(1);
        self.state = State::FinWait;

        let mut fin_acked = false;
        let mut retries = 0u32;

        loop {
            if !fin_acked {
                tracing::debug!(fin_seq, retries, "sending FIN");
                self.channel.send(&fin.encode(), self.remote_addr)?;
            }

            match self.channel.recv(RECV_BUF_BYTES) {
                Ok((raw, from)) => {
                    if from != self.remote_addr {
                        continue;
                    }
                    let packet = match Packet::decode(&raw) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    if packet.conn_id != self.conn_id {
                        continue;
                    }

                    if packet.flags.fin {
                        self.handle_fin(&packet)?;
                    } else if packet.flags.ack && packet.ack == fin_seq.wrapping_add(1) {
                        tracing::debug!("FIN acknowledged");
                        fin_acked = true;
                    } else {
                        continue;
                    }

                    retries = 0;

                    if fin_acked && self.fin_received {
                        self.state = State::Closed;
                        tracing::info!(conn_id = self.conn_id, "connection closed");
                        return Ok(());
                    }
                }
                Err(Error::Timeout) => {
                    retries += 1;
                    if retries > self.config.close_max_retries {
                        return Err(Error::CloseFailed);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
