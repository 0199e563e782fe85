//! Wire-level message types.

use keyneg_types::WireError;

/// Message types of the three-message negotiation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    /// Initiator's nonce.
    Random1 = 1,
    /// Responder's nonce.
    Random2 = 2,
    /// Initiator's completion notice.
    Confirm = 3,
}

impl PacketType {
    /// Parse a packet type from its wire representation.
    pub fn from_wire(value: u32) -> Result<Self, WireError> {
        match value {
            1 => Ok(Self::Random1),
            2 => Ok(Self::Random2),
            3 => Ok(Self::Confirm),
            _ => Err(WireError::UnknownPacketType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_from_wire() {
        assert_eq!(PacketType::from_wire(1), Ok(PacketType::Random1));
        assert_eq!(PacketType::from_wire(2), Ok(PacketType::Random2));
        assert_eq!(PacketType::from_wire(3), Ok(PacketType::Confirm));
        assert_eq!(PacketType::from_wire(0), Err(WireError::UnknownPacketType));
        assert_eq!(PacketType::from_wire(4), Err(WireError::UnknownPacketType));
    }
}
