//! TLV packet header encoding.
//!
//! Every forkstream datagram starts with the same 8-byte header:
//!
//! ```text
//! 0        1                3                                7        8
//! +--------+----------------+--------------------------------+--------+
//! |  type  |     length     |           stream_id            |  dir   |
//! +--------+----------------+--------------------------------+--------+
//! ```
//!
//! All multi-byte fields are big-endian.

/// Header size in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest value the 16-bit length field can carry
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Kind of packet carried after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Per-direction stream metadata, sent once at session start
    Signaling = 0x01,
    /// One captured audio frame
    Audio = 0x02,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(PacketType::Signaling),
            0x02 => Some(PacketType::Audio),
            _ => None,
        }
    }
}

/// Audio direction relative to the forked channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Audio read from the channel (received from the far end)
    Rx = 0x01,
    /// Audio written to the channel (sent to the far end)
    Tx = 0x02,
}

impl Direction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Direction::Rx),
            0x02 => Some(Direction::Tx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }
}

/// Forkstream packet header (8 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// What follows the header
    pub packet_type: PacketType,
    /// Total packet length including this header
    pub packet_length: u16,
    /// Stream this packet belongs to
    pub stream_id: u32,
    /// Audio direction
    pub direction: Direction,
}

impl PacketHeader {
    /// Encode the header into the first 8 bytes of `buffer`.
    ///
    /// Returns the number of bytes written, or 0 if the buffer is too small.
    pub fn encode(&self, buffer: &mut [u8]) -> usize {
        if buffer.len() < HEADER_SIZE {
            return 0;
        }

        buffer[0] = self.packet_type as u8;
        buffer[1..3].copy_from_slice(&self.packet_length.to_be_bytes());
        buffer[3..7].copy_from_slice(&self.stream_id.to_be_bytes());
        buffer[7] = self.direction as u8;

        HEADER_SIZE
    }

    /// Parse a header from received bytes.
    ///
    /// The sender never decodes; this exists for tests and diagnostic tools.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }

        Some(PacketHeader {
            packet_type: PacketType::from_u8(data[0])?,
            packet_length: u16::from_be_bytes([data[1], data[2]]),
            stream_id: u32::from_be_bytes([data[3], data[4], data[5], data[6]]),
            direction: Direction::from_u8(data[7])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader {
            packet_type: PacketType::Audio,
            packet_length: 172,
            stream_id: 0xDEADBEEF,
            direction: Direction::Tx,
        };

        let mut buffer = [0u8; HEADER_SIZE];
        assert_eq!(header.encode(&mut buffer), HEADER_SIZE);
        assert_eq!(buffer, [0x02, 0x00, 0xAC, 0xDE, 0xAD, 0xBE, 0xEF, 0x02]);
    }

    #[test]
    fn test_header_parse() {
        let data = [0x01, 0x00, 0xAC, 0x12, 0x34, 0x56, 0x78, 0x01];

        let header = PacketHeader::parse(&data).unwrap();
        assert_eq!(header.packet_type, PacketType::Signaling);
        assert_eq!(header.packet_length, 172);
        assert_eq!(header.stream_id, 0x12345678);
        assert_eq!(header.direction, Direction::Rx);
    }

    #[test]
    fn test_header_rejects_unknown_tags() {
        assert!(PacketHeader::parse(&[0x03, 0, 8, 0, 0, 0, 1, 0x01]).is_none());
        assert!(PacketHeader::parse(&[0x01, 0, 8, 0, 0, 0, 1, 0x00]).is_none());
        assert!(PacketHeader::parse(&[0x01, 0, 8]).is_none());
    }

    #[test]
    fn test_encode_short_buffer() {
        let header = PacketHeader {
            packet_type: PacketType::Signaling,
            packet_length: 8,
            stream_id: 1,
            direction: Direction::Rx,
        };
        let mut buffer = [0u8; 4];
        assert_eq!(header.encode(&mut buffer), 0);
    }
}
