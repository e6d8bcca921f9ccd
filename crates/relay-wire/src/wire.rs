//! # Wire format
//!
//! The on-wire packet is two fixed-size, big-endian headers followed by a
//! payload: a 17-byte outer "link" header used by the emulator to route, and
//! a 9-byte inner "transport" header interpreted by the sender/requester.
//!
//! ```text
//! +-----------------------------------+------------------+---------+
//! | outer header (17 bytes)           | inner (9 bytes)  | payload |
//! +-----------------------------------+------------------+---------+
//! ```

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Outer header size in bytes.
pub const OUTER_HEADER_LEN: usize = 17;
/// Inner header size in bytes.
pub const INNER_HEADER_LEN: usize = 9;
/// Combined header size; the minimum length of any valid packet.
pub const HEADER_LEN: usize = OUTER_HEADER_LEN + INNER_HEADER_LEN;
/// Largest datagram this crate will encode or accept on decode.
pub const MAX_PACKET_LEN: usize = 5500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("packet too short: {len} bytes, need at least {HEADER_LEN}")]
    TooShort { len: usize },
    #[error("packet exceeds maximum size: {len} bytes, max {MAX_PACKET_LEN}")]
    TooLong { len: usize },
    #[error("unrecognized packet type byte {0:#04x}")]
    UnknownType(u8),
    #[error("priority {0} out of range 1..=3")]
    InvalidPriority(u8),
}

/// Strict priority level. `1` drains before `2` before `3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    One = 1,
    Two = 2,
    Three = 3,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Zero-based index into a 3-element queue array.
    pub fn index(self) -> usize {
        (self as u8 - 1) as usize
    }
}

impl TryFrom<u8> for Priority {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::One),
            2 => Ok(Priority::Two),
            3 => Ok(Priority::Three),
            other => Err(WireError::InvalidPriority(other)),
        }
    }
}

/// Inner-header packet type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// `R` — chunk request, payload is the requested filename.
    Request,
    /// `D` — file data, payload is a chunk byte range.
    Data,
    /// `A` — acknowledgement, no payload.
    Ack,
    /// `E` — end of stream, no payload, never dropped by the emulator.
    End,
}

impl PacketType {
    pub fn as_byte(self) -> u8 {
        match self {
            PacketType::Request => b'R',
            PacketType::Data => b'D',
            PacketType::Ack => b'A',
            PacketType::End => b'E',
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'R' => Ok(PacketType::Request),
            b'D' => Ok(PacketType::Data),
            b'A' => Ok(PacketType::Ack),
            b'E' => Ok(PacketType::End),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// An IPv4 host + port pair as carried in the outer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

impl From<std::net::SocketAddrV4> for Endpoint {
    fn from(addr: std::net::SocketAddrV4) -> Self {
        Endpoint::new(*addr.ip(), addr.port())
    }
}

impl From<Endpoint> for std::net::SocketAddrV4 {
    fn from(ep: Endpoint) -> Self {
        std::net::SocketAddrV4::new(ep.ip, ep.port)
    }
}

/// A fully decoded packet: both headers plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub priority: Priority,
    pub src: Endpoint,
    pub dest: Endpoint,
    pub packet_type: PacketType,
    pub seq_num: u32,
    /// Inner `length` field: payload length for DATA, window size for
    /// REQUEST, zero for ACK/END.
    pub length: u32,
    pub payload: Bytes,
}

impl Packet {
    /// `outer_length` as it would appear on the wire: inner header plus payload.
    pub fn outer_length(&self) -> u32 {
        INNER_HEADER_LEN as u32 + self.payload.len() as u32
    }

    /// Encode this packet into its wire representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());

        buf.put_u8(self.priority.as_u8());
        buf.put_u32(u32::from(self.src.ip));
        buf.put_u16(self.src.port);
        buf.put_u32(u32::from(self.dest.ip));
        buf.put_u16(self.dest.port);
        buf.put_u32(self.outer_length());

        buf.put_u8(self.packet_type.as_byte());
        buf.put_u32(self.seq_num);
        buf.put_u32(self.length);

        buf.put_slice(&self.payload);

        buf.freeze()
    }

    /// Decode a packet from raw datagram bytes.
    ///
    /// Fails with [`WireError::TooShort`] when `bytes` is shorter than
    /// [`HEADER_LEN`], [`WireError::TooLong`] above [`MAX_PACKET_LEN`], and
    /// [`WireError::UnknownType`]/[`WireError::InvalidPriority`] when the
    /// respective field doesn't match a known discriminator.
    pub fn decode(bytes: &[u8]) -> Result<Packet, WireError> {
        if bytes.len() > MAX_PACKET_LEN {
            return Err(WireError::TooLong { len: bytes.len() });
        }
        if bytes.len() < HEADER_LEN {
            return Err(WireError::TooShort { len: bytes.len() });
        }

        let mut buf = bytes;

        let priority = Priority::try_from(buf.get_u8())?;
        let src_ip = Ipv4Addr::from(buf.get_u32());
        let src_port = buf.get_u16();
        let dest_ip = Ipv4Addr::from(buf.get_u32());
        let dest_port = buf.get_u16();
        let _outer_length = buf.get_u32();

        let packet_type = PacketType::try_from(buf.get_u8())?;
        let seq_num = buf.get_u32();
        let length = buf.get_u32();

        let payload = Bytes::copy_from_slice(buf);

        Ok(Packet {
            priority,
            src: Endpoint::new(src_ip, src_port),
            dest: Endpoint::new(dest_ip, dest_port),
            packet_type,
            seq_num,
            length,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(a: u8, b: u8, c: u8, d: u8, port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::new(a, b, c, d), port)
    }

    #[test]
    fn roundtrip_data_packet() {
        let packet = Packet {
            priority: Priority::One,
            src: ep(10, 0, 0, 1, 5000),
            dest: ep(10, 0, 0, 2, 6000),
            packet_type: PacketType::Data,
            seq_num: 42,
            length: 4,
            payload: Bytes::from_static(b"ABCD"),
        };
        let encoded = packet.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn roundtrip_request_packet() {
        let packet = Packet {
            priority: Priority::Two,
            src: ep(192, 168, 1, 1, 2050),
            dest: ep(192, 168, 1, 2, 2051),
            packet_type: PacketType::Request,
            seq_num: 0,
            length: 8,
            payload: Bytes::from_static(b"file.txt"),
        };
        assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn roundtrip_ack_and_end_have_empty_payload() {
        for packet_type in [PacketType::Ack, PacketType::End] {
            let packet = Packet {
                priority: Priority::Three,
                src: ep(127, 0, 0, 1, 9000),
                dest: ep(127, 0, 0, 1, 9001),
                packet_type,
                seq_num: 7,
                length: 0,
                payload: Bytes::new(),
            };
            let decoded = Packet::decode(&packet.encode()).unwrap();
            assert_eq!(decoded, packet);
            assert_eq!(decoded.outer_length(), INNER_HEADER_LEN as u32);
        }
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = Packet::decode(&[0u8; HEADER_LEN - 1]).unwrap_err();
        assert_eq!(err, WireError::TooShort { len: HEADER_LEN - 1 });
    }

    #[test]
    fn decode_rejects_oversized_buffer() {
        let buf = vec![0u8; MAX_PACKET_LEN + 1];
        let err = Packet::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::TooLong { len: MAX_PACKET_LEN + 1 });
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let mut packet = Packet {
            priority: Priority::One,
            src: ep(1, 1, 1, 1, 1),
            dest: ep(2, 2, 2, 2, 2),
            packet_type: PacketType::Data,
            seq_num: 1,
            length: 0,
            payload: Bytes::new(),
        }
        .encode()
        .to_vec();
        packet[17] = b'X';
        assert_eq!(
            Packet::decode(&packet).unwrap_err(),
            WireError::UnknownType(b'X')
        );
    }

    #[test]
    fn decode_rejects_bad_priority() {
        let mut packet = Packet {
            priority: Priority::One,
            src: ep(1, 1, 1, 1, 1),
            dest: ep(2, 2, 2, 2, 2),
            packet_type: PacketType::End,
            seq_num: 0,
            length: 0,
            payload: Bytes::new(),
        }
        .encode()
        .to_vec();
        packet[0] = 9;
        assert_eq!(
            Packet::decode(&packet).unwrap_err(),
            WireError::InvalidPriority(9)
        );
    }

    #[test]
    fn payload_length_is_total_len_minus_header() {
        let payload = vec![7u8; 128];
        let packet = Packet {
            priority: Priority::One,
            src: ep(1, 1, 1, 1, 1),
            dest: ep(2, 2, 2, 2, 2),
            packet_type: PacketType::Data,
            seq_num: 1,
            length: payload.len() as u32,
            payload: Bytes::from(payload),
        };
        let encoded = packet.encode();
        assert_eq!(encoded.len() - HEADER_LEN, packet.payload.len());
    }
}
