//! Signaling and audio payload encoding.
//!
//! Signaling packets carry fixed-width, NUL-padded metadata so a receiver can
//! parse them without any shared state. Audio packets carry a 4-byte sequence
//! number followed by the untouched frame bytes.

use crate::error::{ForkError, ForkResult};
use crate::tlv::header::{Direction, PacketHeader, PacketType, HEADER_SIZE, MAX_PACKET_SIZE};

/// Width of the channel id field
pub const CHANNEL_ID_LEN: usize = 64;
/// Width of the extension field
pub const EXTEN_LEN: usize = 32;
/// Width of the caller id field
pub const CALLER_ID_LEN: usize = 32;
/// Width of the called id field
pub const CALLED_ID_LEN: usize = 32;

/// Signaling payload size: four text fields plus a 4-byte timestamp
pub const SIGNALING_PAYLOAD_SIZE: usize =
    CHANNEL_ID_LEN + EXTEN_LEN + CALLER_ID_LEN + CALLED_ID_LEN + 4;

/// Complete signaling packet size (always 172)
pub const SIGNALING_PACKET_SIZE: usize = HEADER_SIZE + SIGNALING_PAYLOAD_SIZE;

/// Audio packet prefix: header plus 4-byte sequence number
pub const AUDIO_PREFIX_SIZE: usize = HEADER_SIZE + 4;

/// Largest frame an audio packet can carry (65523)
pub const MAX_AUDIO_FRAME: usize = MAX_PACKET_SIZE - AUDIO_PREFIX_SIZE;

/// Call metadata announced in signaling packets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetadata {
    pub channel_id: String,
    pub exten: String,
    pub caller_id: String,
    pub called_id: String,
}

impl StreamMetadata {
    /// Build metadata, bounding every field to what its wire slot can hold.
    pub fn new(channel_id: &str, exten: &str, caller_id: &str, called_id: &str) -> Self {
        Self {
            channel_id: truncate_field(channel_id, CHANNEL_ID_LEN).to_string(),
            exten: truncate_field(exten, EXTEN_LEN).to_string(),
            caller_id: truncate_field(caller_id, CALLER_ID_LEN).to_string(),
            called_id: truncate_field(called_id, CALLED_ID_LEN).to_string(),
        }
    }
}

/// Longest prefix of `value` that fits a `width`-byte field with a trailing NUL.
///
/// Never splits a UTF-8 sequence.
pub fn truncate_field(value: &str, width: usize) -> &str {
    let max = width.saturating_sub(1);
    if value.len() <= max {
        return value;
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn write_field(dst: &mut [u8], value: &str) {
    let text = truncate_field(value, dst.len());
    dst.fill(0);
    dst[..text.len()].copy_from_slice(text.as_bytes());
}

fn read_field(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// Encode a complete signaling packet.
///
/// The output is always [`SIGNALING_PACKET_SIZE`] bytes; long metadata is
/// truncated, short metadata is NUL-padded.
pub fn encode_signaling(
    stream_id: u32,
    direction: Direction,
    metadata: &StreamMetadata,
    timestamp: u32,
) -> [u8; SIGNALING_PACKET_SIZE] {
    let mut packet = [0u8; SIGNALING_PACKET_SIZE];

    let header = PacketHeader {
        packet_type: PacketType::Signaling,
        packet_length: SIGNALING_PACKET_SIZE as u16,
        stream_id,
        direction,
    };
    header.encode(&mut packet);

    let mut offset = HEADER_SIZE;
    for (value, width) in [
        (&metadata.channel_id, CHANNEL_ID_LEN),
        (&metadata.exten, EXTEN_LEN),
        (&metadata.caller_id, CALLER_ID_LEN),
        (&metadata.called_id, CALLED_ID_LEN),
    ] {
        write_field(&mut packet[offset..offset + width], value);
        offset += width;
    }

    packet[offset..offset + 4].copy_from_slice(&timestamp.to_be_bytes());

    packet
}

/// Encode the 12-byte prefix of an audio packet.
///
/// The frame bytes themselves are not copied; they follow the prefix as the
/// second buffer of a vectored send. Frames larger than [`MAX_AUDIO_FRAME`]
/// are rejected instead of wrapping the length field.
pub fn encode_audio_prefix(
    stream_id: u32,
    direction: Direction,
    sequence: u32,
    frame_len: usize,
) -> ForkResult<[u8; AUDIO_PREFIX_SIZE]> {
    if frame_len > MAX_AUDIO_FRAME {
        return Err(ForkError::OversizedFrame { len: frame_len });
    }

    let mut prefix = [0u8; AUDIO_PREFIX_SIZE];

    let header = PacketHeader {
        packet_type: PacketType::Audio,
        packet_length: (AUDIO_PREFIX_SIZE + frame_len) as u16,
        stream_id,
        direction,
    };
    header.encode(&mut prefix);
    prefix[HEADER_SIZE..].copy_from_slice(&sequence.to_be_bytes());

    Ok(prefix)
}

/// Encode a complete audio packet into a single buffer.
///
/// The send path uses [`encode_audio_prefix`] instead; this is for callers
/// that need the whole datagram as one byte vector.
pub fn encode_audio(
    stream_id: u32,
    direction: Direction,
    sequence: u32,
    frame: &[u8],
) -> ForkResult<Vec<u8>> {
    let prefix = encode_audio_prefix(stream_id, direction, sequence, frame.len())?;

    let mut packet = Vec::with_capacity(AUDIO_PREFIX_SIZE + frame.len());
    packet.extend_from_slice(&prefix);
    packet.extend_from_slice(frame);
    Ok(packet)
}

/// Decoded signaling payload (diagnostics and tests only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingPayload {
    pub metadata: StreamMetadata,
    pub timestamp: u32,
}

impl SignalingPayload {
    /// Parse the 164-byte payload that follows a signaling header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIGNALING_PAYLOAD_SIZE {
            return None;
        }

        let exten_at = CHANNEL_ID_LEN;
        let caller_at = exten_at + EXTEN_LEN;
        let called_at = caller_at + CALLER_ID_LEN;
        let ts_at = called_at + CALLED_ID_LEN;

        Some(SignalingPayload {
            metadata: StreamMetadata {
                channel_id: read_field(&data[..exten_at]),
                exten: read_field(&data[exten_at..caller_at]),
                caller_id: read_field(&data[caller_at..called_at]),
                called_id: read_field(&data[called_at..ts_at]),
            },
            timestamp: u32::from_be_bytes([
                data[ts_at],
                data[ts_at + 1],
                data[ts_at + 2],
                data[ts_at + 3],
            ]),
        })
    }
}
