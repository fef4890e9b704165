//! Typed payload consumption.

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use bytes::Buf;

/// Reads typed fields back out of a packet payload.
///
/// Fields must be read in the order they were written. Running past the end
/// of the payload is a [`ProtocolError::Payload`] error, never a
/// panic or a short read.
pub struct PacketReader<'a> {
    cursor: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(packet: &'a Packet) -> Self {
        Self {
            cursor: &packet.payload,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn need(&self, bytes: usize, what: &str) -> Result<()> {
        if self.cursor.remaining() < bytes {
            return Err(ProtocolError::Payload(format!(
                "need {bytes} bytes for {what}, {} left",
                self.cursor.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1, "u8")?;
        Ok(self.cursor.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.need(2, "i16")?;
        Ok(self.cursor.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4, "i32")?;
        Ok(self.cursor.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.need(8, "i64")?;
        Ok(self.cursor.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.need(4, "f32")?;
        Ok(self.cursor.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.need(8, "f64")?;
        Ok(self.cursor.get_f64())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a 4-byte length prefix followed by that many bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        self.need(4, "length prefix")?;
        let len = self.cursor.get_u32() as usize;
        self.need(len, "byte field")?;
        let out = self.cursor[..len].to_vec();
        self.cursor.advance(len);
        Ok(out)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::Payload(format!("invalid UTF-8: {e}")))
    }
}
