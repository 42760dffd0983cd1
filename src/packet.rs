//! Packet framing: a canonical, self-describing JSON header followed by a
//! two-byte separator and the raw payload. Grounded in `original_source`'s
//! `packet.py`, whose `make_packet`/`parse_packet` pair defines this exact
//! wire contract (JSON header, `b"\n\n"` separator, raw payload bytes).

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Separator between the header and the payload, per the wire format.
pub const SEPARATOR: [u8; 2] = [0x0A, 0x0A];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    #[serde(rename = "SYN")]
    pub syn: bool,
    #[serde(rename = "ACK")]
    pub ack: bool,
    #[serde(rename = "FIN")]
    pub fin: bool,
    #[serde(rename = "DATA")]
    pub data: bool,
}

impl Flags {
    pub fn syn() -> Self {
        Flags { syn: true, ..Default::default() }
    }

    pub fn syn_ack() -> Self {
        Flags { syn: true, ack: true, ..Default::default() }
    }

    pub fn ack() -> Self {
        Flags { ack: true, ..Default::default() }
    }

    pub fn data() -> Self {
        Flags { ack: true, data: true, ..Default::default() }
    }

    pub fn fin() -> Self {
        Flags { ack: true, fin: true, ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    conn_id: u32,
    seq: u32,
    ack: u32,
    flags: Flags,
    rwnd: u32,
    /// CRC32 of the payload bytes, to detect payload corruption that a bit
    /// flip in the payload region would otherwise leave parseable (see
    /// DESIGN.md).
    checksum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub conn_id: u32,
    pub seq: u32,
    pub ack: u32,
    pub flags: Flags,
    pub rwnd: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(conn_id: u32, seq: u32, ack: u32, flags: Flags, rwnd: u32, payload: Vec<u8>) -> Self {
        Packet { conn_id, seq, ack, flags, rwnd, payload }
    }

    /// Encode the header as canonical JSON, append the separator, then the
    /// raw payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let header = Header {
            conn_id: self.conn_id,
            seq: self.seq,
            ack: self.ack,
            flags: self.flags,
            rwnd: self.rwnd,
            checksum: crc32fast::hash(&self.payload),
        };

        let header_bytes = serde_json::to_vec(&header).expect("header serialization is infallible");

        let mut out = Vec::with_capacity(header_bytes.len() + SEPARATOR.len() + self.payload.len());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&SEPARATOR);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a datagram back into a `Packet`. Rejects datagrams missing the
    /// separator, whose header region doesn't deserialize, or whose payload
    /// checksum doesn't match the declared one — any of these cases is
    /// reported as `Error::MalformedPacket`, which the transport treats as a
    /// silent drop.
    pub fn decode(raw: &[u8]) -> Result<Packet, Error> {
        let sep_pos = find_separator(raw).ok_or_else(|| {
            Error::MalformedPacket("missing header/payload separator".to_string())
        })?;

        let header_bytes = &raw[..sep_pos];
        let payload = raw[sep_pos + SEPARATOR.len()..].to_vec();

        let header: Header = serde_json::from_slice(header_bytes)
            .map_err(|e| Error::MalformedPacket(format!("invalid header: {e}")))?;

        if crc32fast::hash(&payload) != header.checksum {
            return Err(Error::MalformedPacket("payload checksum mismatch".to_string()));
        }

        Ok(Packet {
            conn_id: header.conn_id,
            seq: header.seq,
            ack: header.ack,
            flags: header.flags,
            rwnd: header.rwnd,
            payload,
        })
    }
}

fn find_separator(raw: &[u8]) -> Option<usize> {
    raw.windows(SEPARATOR.len()).position(|w| w == SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_well_formed_packet() {
        let packet = Packet::new(42, 1000, 2000, Flags::data(), 1024, b"hello world".to_vec());
        let encoded = packet.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn round_trips_empty_payload() {
        let packet = Packet::new(1, 0, 0, Flags::syn(), 0, Vec::new());
        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn rejects_missing_separator() {
        let err = Packet::decode(b"not a valid header at all").unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }

    #[test]
    fn rejects_corrupted_header() {
        let packet = Packet::new(1, 0, 0, Flags::syn(), 0, b"payload".to_vec());
        let mut encoded = packet.encode();
        encoded[0] ^= 0xFF;
        assert!(Packet::decode(&encoded).is_err());
    }

    #[test]
    fn rejects_corrupted_payload() {
        let packet = Packet::new(1, 0, 0, Flags::data(), 0, b"payload".to_vec());
        let mut encoded = packet.encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(Packet::decode(&encoded).is_err());
    }
}
