//! Negotiation packet structures and their codec.

use std::time::{SystemTime, UNIX_EPOCH};

use keyneg_types::{WireError, HEADER_SIZE, MAGIC, NONCE_SIZE};

use crate::encoding::{bytes_to_words, chop_u32, put_u32, words_to_bytes};
use crate::types::PacketType;

/// Fixed 20-byte packet header, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Frame identification magic, always [`MAGIC`].
    pub magic: u32,
    /// Message type of this packet.
    pub packet_type: PacketType,
    /// Policy id correlating both endpoints' sessions.
    pub sequence: u32,
    /// Sender clock in milliseconds. Informational only, never used for
    /// ordering.
    pub timestamp: u32,
    /// Number of u32 payload words following the header.
    pub payload_len: u32,
}

/// A negotiation datagram: header plus word-aligned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationPacket {
    pub header: PacketHeader,
    pub payload: Vec<u32>,
}

impl NegotiationPacket {
    /// Build a packet of the given type for a policy id.
    ///
    /// `payload` must be a whole number of words (callers pass 32-byte nonces
    /// or nothing).
    pub fn new(packet_type: PacketType, policy_id: u32, payload: &[u8]) -> Self {
        debug_assert!(payload.len() % 4 == 0, "payload must be word-aligned");
        let words = bytes_to_words(payload).unwrap_or_default();
        Self {
            header: PacketHeader {
                magic: MAGIC,
                packet_type,
                sequence: policy_id,
                timestamp: timestamp_ms(),
                payload_len: words.len() as u32,
            },
            payload: words,
        }
    }

    /// Policy id carried in the sequence field.
    pub fn policy_id(&self) -> u32 {
        self.header.sequence
    }

    /// Payload reassembled into bytes.
    pub fn payload_bytes(&self) -> Vec<u8> {
        words_to_bytes(&self.payload)
    }

    /// First nonce-sized chunk of the payload, if the payload carries one.
    pub fn payload_nonce(&self) -> Option<[u8; NONCE_SIZE]> {
        let bytes = self.payload_bytes();
        if bytes.len() < NONCE_SIZE {
            return None;
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        Some(nonce)
    }

    /// Total size on the wire in bytes.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() * 4
    }

    /// Serialize into `out`, appending.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.reserve(self.wire_size());
        put_u32(out, self.header.magic);
        put_u32(out, self.header.packet_type as u32);
        put_u32(out, self.header.sequence);
        put_u32(out, self.header.timestamp);
        put_u32(out, self.header.payload_len);
        for &word in &self.payload {
            put_u32(out, word);
        }
    }

    /// Parse one datagram.
    pub fn decode(mut data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::Truncated);
        }

        let magic = chop_u32(&mut data).ok_or(WireError::Truncated)?;
        if magic != MAGIC {
            return Err(WireError::BadMagic);
        }
        let raw_type = chop_u32(&mut data).ok_or(WireError::Truncated)?;
        let packet_type = PacketType::from_wire(raw_type)?;
        let sequence = chop_u32(&mut data).ok_or(WireError::Truncated)?;
        let timestamp = chop_u32(&mut data).ok_or(WireError::Truncated)?;
        let payload_len = chop_u32(&mut data).ok_or(WireError::Truncated)?;

        if data.len() % 4 != 0 {
            return Err(WireError::Unaligned);
        }
        if payload_len as usize * 4 != data.len() {
            return Err(WireError::LengthMismatch);
        }

        let mut payload = Vec::with_capacity(payload_len as usize);
        while let Some(word) = chop_u32(&mut data) {
            payload.push(word);
        }

        Ok(Self {
            header: PacketHeader {
                magic,
                packet_type,
                sequence,
                timestamp,
                payload_len,
            },
            payload,
        })
    }
}

/// Millisecond-scale sender clock for the header timestamp field.
pub fn timestamp_ms() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_vec(packet: &NegotiationPacket) -> Vec<u8> {
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        buf
    }

    #[test]
    fn test_packet_roundtrip_with_nonce() {
        let nonce: Vec<u8> = (0u8..32).collect();
        let packet = NegotiationPacket::new(PacketType::Random1, 456, &nonce);

        let buf = encode_to_vec(&packet);
        assert_eq!(buf.len(), packet.wire_size());
        assert_eq!(buf.len(), HEADER_SIZE + 32);

        let decoded = NegotiationPacket::decode(&buf).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.policy_id(), 456);
        assert_eq!(decoded.payload_nonce().unwrap().as_slice(), &nonce[..]);
    }

    #[test]
    fn test_nonce_bytes_unchanged_on_wire() {
        let nonce: Vec<u8> = (100u8..132).collect();
        let packet = NegotiationPacket::new(PacketType::Random2, 9, &nonce);
        let buf = encode_to_vec(&packet);
        assert_eq!(&buf[HEADER_SIZE..], &nonce[..]);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let packet = NegotiationPacket::new(PacketType::Confirm, 123, &[]);
        assert_eq!(packet.header.payload_len, 0);

        let buf = encode_to_vec(&packet);
        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = NegotiationPacket::decode(&buf).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.payload_nonce(), None);
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let packet = NegotiationPacket::new(PacketType::Confirm, 1, &[]);
        let buf = encode_to_vec(&packet);
        assert_eq!(
            NegotiationPacket::decode(&buf[..19]),
            Err(WireError::Truncated)
        );
        assert_eq!(NegotiationPacket::decode(&[]), Err(WireError::Truncated));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let packet = NegotiationPacket::new(PacketType::Confirm, 1, &[]);
        let mut buf = encode_to_vec(&packet);
        buf[..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(NegotiationPacket::decode(&buf), Err(WireError::BadMagic));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let packet = NegotiationPacket::new(PacketType::Confirm, 1, &[]);
        let mut buf = encode_to_vec(&packet);
        buf[4..8].copy_from_slice(&7u32.to_le_bytes());
        assert_eq!(
            NegotiationPacket::decode(&buf),
            Err(WireError::UnknownPacketType)
        );
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        // payload_len says 2 words but 12 bytes of payload follow
        let packet = NegotiationPacket::new(PacketType::Random1, 1, &[0u8; 12]);
        let mut buf = encode_to_vec(&packet);
        buf[16..20].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(
            NegotiationPacket::decode(&buf),
            Err(WireError::LengthMismatch)
        );
    }

    #[test]
    fn test_decode_rejects_unaligned_tail() {
        let packet = NegotiationPacket::new(PacketType::Random1, 1, &[0u8; 8]);
        let mut buf = encode_to_vec(&packet);
        buf.push(0xAB);
        assert_eq!(NegotiationPacket::decode(&buf), Err(WireError::Unaligned));
    }
}
