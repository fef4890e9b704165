//! Tokio codec framing packets over a byte stream.

use crate::core::packet::{Packet, PacketType, HEADER_LEN};
use crate::error::ProtocolError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Stateless framing codec for [`Packet`]s.
///
/// The decoder consumes nothing until a complete frame is buffered, so a
/// frame is decoded atomically or not at all. A stream that ends mid-frame
/// surfaces as [`ProtocolError::InvalidFrame`] from `decode_eof`.
pub struct PacketCodec;

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        packet.write_to(dst);
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // Peek the header without consuming, so partial frames stay intact.
        let tag = src[0];
        let payload_len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;

        if src.len() < HEADER_LEN + payload_len {
            return Ok(None);
        }

        let packet_type = PacketType::from_tag(tag)?;
        src.advance(1);
        let id = src.get_u16();
        let _ = src.get_u32();
        let payload = src.split_to(payload_len).to_vec();

        Ok(Some(Packet {
            packet_type,
            id,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            // Bytes left over at EOF: the peer died mid-frame.
            None => Err(ProtocolError::InvalidFrame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Packet;

    fn encode(packet: &Packet) -> BytesMut {
        let mut buf = BytesMut::new();
        PacketCodec.encode(packet.clone(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn encode_decode_roundtrip() {
        let packet = Packet::request(9, vec![1, 2, 3, 4]);
        let mut buf = encode(&packet);
        let decoded = PacketCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_preserves_buffer() {
        let packet = Packet::request(9, vec![0u8; 32]);
        let full = encode(&packet);
        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        let before = buf.len();
        assert!(PacketCodec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), before);
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let a = Packet::request(1, b"a".to_vec());
        let b = Packet::reply(2, b"bb".to_vec());
        let mut buf = encode(&a);
        buf.extend_from_slice(&encode(&b));

        assert_eq!(PacketCodec.decode(&mut buf).unwrap().unwrap(), a);
        assert_eq!(PacketCodec.decode(&mut buf).unwrap().unwrap(), b);
        assert!(buf.is_empty());
    }

    #[test]
    fn eof_mid_frame_is_framing_error() {
        let packet = Packet::request(3, vec![0u8; 8]);
        let full = encode(&packet);
        for cut in 1..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            let result = PacketCodec.decode_eof(&mut buf);
            assert!(
                matches!(result, Err(ProtocolError::InvalidFrame)),
                "cut at {cut} must be a framing error"
            );
        }
    }

    #[test]
    fn eof_on_empty_buffer_is_clean() {
        let mut buf = BytesMut::new();
        assert!(PacketCodec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_type_tag_is_rejected_once_frame_is_complete() {
        let mut bytes = Packet::request(1, vec![5]).to_bytes();
        bytes[0] = 0xFF;
        let mut buf = BytesMut::from(&bytes[..]);
        assert!(matches!(
            PacketCodec.decode(&mut buf),
            Err(ProtocolError::InvalidPacketType(0xFF))
        ));
    }
}
