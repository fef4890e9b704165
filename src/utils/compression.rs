//! Whole-payload gzip transform.

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Maximum decompressed payload size. Inflating stops here so a hostile
/// peer cannot exhaust memory with a tiny compressed frame.
const MAX_DECOMPRESSED_LEN: usize = 64 * 1024 * 1024;

/// Compresses a packet's payload with gzip at maximum level, keeping type
/// and id. Note that compressing small or high-entropy payloads can grow
/// them.
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if the encoder fails.
pub fn compress(packet: &Packet) -> Result<Packet> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(packet.payload.len() / 2),
        Compression::best(),
    );
    encoder
        .write_all(&packet.payload)
        .map_err(|_| ProtocolError::CompressionFailure)?;
    let compressed = encoder
        .finish()
        .map_err(|_| ProtocolError::CompressionFailure)?;

    Ok(Packet::new(packet.packet_type, packet.id, compressed))
}

/// Decompresses a packet's payload, keeping type and id.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if:
/// - the payload is not valid gzip data
/// - the output exceeds `MAX_DECOMPRESSED_LEN`
pub fn decompress(packet: &Packet) -> Result<Packet> {
    let mut decoder = GzDecoder::new(&packet.payload[..]);
    let mut payload = Vec::new();

    let mut buffer = [0u8; 8192];
    loop {
        match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                payload.extend_from_slice(&buffer[..n]);
                if payload.len() > MAX_DECOMPRESSED_LEN {
                    return Err(ProtocolError::DecompressionFailure);
                }
            }
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }

    Ok(Packet::new(packet.packet_type, packet.id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::PacketType;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn compression_roundtrip_preserves_type_and_id() {
        let payload = b"Hello, World! Hello, World! Hello, World!".to_vec();
        let packet = Packet::reply(42, payload.clone());

        let compressed = compress(&packet).unwrap();
        assert_eq!(compressed.packet_type, PacketType::Reply);
        assert_eq!(compressed.id, 42);

        let restored = decompress(&compressed).unwrap();
        assert_eq!(restored, packet);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn repetitive_payload_shrinks() {
        let packet = Packet::request(1, vec![0x55; 64 * 1024]);
        let compressed = compress(&packet).unwrap();
        assert!(compressed.payload.len() < packet.payload.len());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn tiny_payload_may_grow() {
        let packet = Packet::request(1, b"hi".to_vec());
        let compressed = compress(&packet).unwrap();
        // gzip framing alone outweighs two bytes of input
        assert!(compressed.payload.len() > packet.payload.len());
        assert_eq!(decompress(&compressed).unwrap(), packet);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn empty_payload_roundtrips() {
        let packet = Packet::request(0, vec![]);
        let roundtrip = decompress(&compress(&packet).unwrap()).unwrap();
        assert_eq!(roundtrip, packet);
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let packet = Packet::request(1, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(matches!(
            decompress(&packet),
            Err(ProtocolError::DecompressionFailure)
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn truncated_gzip_is_rejected() {
        let packet = Packet::request(1, vec![7u8; 4096]);
        let mut compressed = compress(&packet).unwrap();
        compressed.payload.truncate(compressed.payload.len() / 2);
        assert!(decompress(&compressed).is_err());
    }
}
