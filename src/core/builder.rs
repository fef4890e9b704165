//! Typed payload construction.

use crate::core::packet::{Packet, PacketType};
use bytes::{BufMut, BytesMut};

/// Accumulates typed fields into a packet payload.
///
/// Fields are written big-endian, in order; the matching
/// [`PacketReader`](crate::core::reader::PacketReader) must read them back in
/// the same order. Byte slices and strings carry a 4-byte length prefix.
///
/// ```
/// use framelink::core::builder::PacketBuilder;
/// use framelink::core::packet::PacketType;
///
/// let packet = PacketBuilder::new(PacketType::Request)
///     .with_id(7)
///     .write_string("ping")
///     .write_i32(1)
///     .build();
/// assert_eq!(packet.id, 7);
/// ```
pub struct PacketBuilder {
    packet_type: PacketType,
    id: u16,
    buf: BytesMut,
}

impl PacketBuilder {
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            id: 0,
            buf: BytesMut::new(),
        }
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn write_u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    pub fn write_i16(mut self, value: i16) -> Self {
        self.buf.put_i16(value);
        self
    }

    pub fn write_i32(mut self, value: i32) -> Self {
        self.buf.put_i32(value);
        self
    }

    pub fn write_i64(mut self, value: i64) -> Self {
        self.buf.put_i64(value);
        self
    }

    pub fn write_f32(mut self, value: f32) -> Self {
        self.buf.put_f32(value);
        self
    }

    pub fn write_f64(mut self, value: f64) -> Self {
        self.buf.put_f64(value);
        self
    }

    pub fn write_bool(mut self, value: bool) -> Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    /// Writes a 4-byte length prefix followed by the bytes.
    pub fn write_bytes(mut self, value: &[u8]) -> Self {
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value);
        self
    }

    /// Writes the string as length-prefixed UTF-8.
    pub fn write_string(self, value: &str) -> Self {
        self.write_bytes(value.as_bytes())
    }

    /// Current payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.buf.len()
    }

    pub fn build(self) -> Packet {
        Packet::new(self.packet_type, self.id, self.buf.to_vec())
    }
}
