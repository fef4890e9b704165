//! Packet value type and its byte-level encoding.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// Size of the fixed frame header: 1 byte type + 2 byte id + 4 byte length.
pub const HEADER_LEN: usize = 7;

/// Direction tag of a [`Packet`]. By convention the tag, not the id,
/// distinguishes a request from its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Request = 0,
    Reply = 1,
}

impl PacketType {
    /// Maps a wire tag back to a type; unknown tags are a framing error.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(PacketType::Request),
            1 => Ok(PacketType::Reply),
            other => Err(ProtocolError::InvalidPacketType(other)),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// One immutable, self-describing message.
///
/// Created once by a sender, consumed once by a decoder, never mutated.
/// A zero-length payload is valid; the length is always transmitted
/// explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub id: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, id: u16, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            id,
            payload,
        }
    }

    /// Shorthand for a request packet.
    pub fn request(id: u16, payload: Vec<u8>) -> Self {
        Self::new(PacketType::Request, id, payload)
    }

    /// Shorthand for a reply packet.
    pub fn reply(id: u16, payload: Vec<u8>) -> Self {
        Self::new(PacketType::Reply, id, payload)
    }

    pub fn is_request(&self) -> bool {
        self.packet_type == PacketType::Request
    }

    pub fn is_reply(&self) -> bool {
        self.packet_type == PacketType::Reply
    }

    /// Encodes the packet into a fresh byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Encodes the packet into the given buffer.
    pub(crate) fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.put_u8(self.packet_type.tag());
        buf.put_u16(self.id);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Decodes one packet from a complete byte slice.
    ///
    /// The slice must contain exactly one whole frame; a slice cut anywhere
    /// inside the frame is an [`ProtocolError::InvalidFrame`], never a short
    /// packet.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::InvalidFrame);
        }

        let packet_type = PacketType::from_tag(bytes.get_u8())?;
        let id = bytes.get_u16();
        let len = bytes.get_u32() as usize;

        if bytes.remaining() < len {
            return Err(ProtocolError::InvalidFrame);
        }

        let payload = bytes[..len].to_vec();
        Ok(Packet {
            packet_type,
            id,
            payload,
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: [{:?}] ID: [{}] Payload: [{} bytes]",
            self.packet_type,
            self.id,
            self.payload.len()
        )
    }
}
