//! Crate-wide error taxonomy, per the failure classes enumerated in the
//! design: recoverable events are handled internally and never reach this
//! type; only terminal, caller-visible failures are represented here.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("timed out waiting for a datagram")]
    Timeout,

    #[error("handshake failed after exhausting retries")]
    HandshakeFailed,

    #[error("delivery failed after exhausting retries with unacknowledged data remaining")]
    DeliveryFailed,

    #[error("close failed: FIN was never acknowledged after exhausting retries")]
    CloseFailed,
}
