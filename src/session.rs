//! Per-call stream session.
//!
//! A session owns the UDP socket, the stream id, the call metadata and the
//! two independent sequence counters. All methods take `&self`: RX and TX
//! frames of the same call may be delivered from different threads.

use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use log::debug;

use crate::args::parse_destination;
use crate::error::{ForkError, ForkResult};
use crate::stream_id::{unix_seconds, StreamIdGenerator};
use crate::tlv::{
    encode_audio_prefix, encode_signaling, Direction, ForkSocket, StreamMetadata,
    SIGNALING_PACKET_SIZE,
};

/// Session statistics (lock-free atomic updates).
#[derive(Default)]
pub struct SessionStats {
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub oversized_dropped: AtomicU64,
}

impl SessionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            oversized_dropped: self.oversized_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of statistics (for non-atomic access).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub oversized_dropped: u64,
}

/// One forking instance bound to one call leg.
pub struct StreamSession {
    /// Transport; declared first so it is closed before the rest is released
    socket: ForkSocket,
    /// Correlates every packet of this session, both directions
    stream_id: u32,
    /// Metadata announced in signaling packets
    metadata: StreamMetadata,
    /// Last RX sequence number issued (0 = none yet)
    rx_sequence: AtomicU32,
    /// Last TX sequence number issued (0 = none yet)
    tx_sequence: AtomicU32,
    /// Creation time, seconds since the Unix epoch
    created_at: u32,
    stats: SessionStats,
}

impl StreamSession {
    /// Validate `destination` ("ip:port") and open a session towards it.
    ///
    /// An invalid destination is rejected before any socket is created.
    pub fn create(
        destination: &str,
        metadata: StreamMetadata,
        ids: &StreamIdGenerator,
    ) -> ForkResult<Self> {
        let destination = parse_destination(destination)?;
        Self::open(destination, metadata, ids)
    }

    /// Open a session towards an already validated destination.
    pub fn open(
        destination: SocketAddrV4,
        metadata: StreamMetadata,
        ids: &StreamIdGenerator,
    ) -> ForkResult<Self> {
        if destination.port() == 0 {
            return Err(ForkError::InvalidDestination(destination.to_string()));
        }

        let socket = ForkSocket::open(destination)?;

        Ok(Self {
            socket,
            stream_id: ids.generate(),
            metadata,
            rx_sequence: AtomicU32::new(0),
            tx_sequence: AtomicU32::new(0),
            created_at: unix_seconds(),
            stats: SessionStats::default(),
        })
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.socket.destination()
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn created_at(&self) -> u32 {
        self.created_at
    }

    /// Last sequence number issued for `direction` (0 before the first frame).
    pub fn sequence(&self, direction: Direction) -> u32 {
        self.counter(direction).load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn counter(&self, direction: Direction) -> &AtomicU32 {
        match direction {
            Direction::Rx => &self.rx_sequence,
            Direction::Tx => &self.tx_sequence,
        }
    }

    /// Advance the counter for `direction` and return the new value.
    ///
    /// Wraps from `u32::MAX` to 0.
    pub fn record_frame(&self, direction: Direction) -> u32 {
        self.counter(direction)
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1)
    }

    /// Build the signaling packet for `direction`.
    pub fn encode_signaling(&self, direction: Direction) -> [u8; SIGNALING_PACKET_SIZE] {
        encode_signaling(self.stream_id, direction, &self.metadata, self.created_at)
    }

    /// Send the one-time signaling packet for `direction`.
    pub fn send_signaling(&self, direction: Direction) -> ForkResult<()> {
        let packet = self.encode_signaling(direction);
        let result = self.socket.send(&packet);
        self.account(&result);
        result?;

        debug!(
            "ForkStream: Sent signaling packet (stream_id: {}, direction: {})",
            self.stream_id,
            direction.as_str()
        );
        Ok(())
    }

    /// Encode and send a frame whose sequence number was already recorded.
    ///
    /// Callers advance the counter with [`record_frame`](Self::record_frame)
    /// first, so a dropped or failed frame leaves a visible gap.
    pub fn send_sequenced(
        &self,
        direction: Direction,
        sequence: u32,
        frame: &[u8],
    ) -> ForkResult<usize> {
        let prefix = match encode_audio_prefix(self.stream_id, direction, sequence, frame.len()) {
            Ok(prefix) => prefix,
            Err(e) => {
                self.stats.oversized_dropped.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let result = self.socket.send_vectored(&prefix, frame);
        self.account(&result);
        result
    }

    fn account(&self, result: &ForkResult<usize>) {
        match result {
            Ok(sent) => {
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(*sent as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        debug!(
            "ForkStream: Closing UDP socket (stream_id: {}, destination: {})",
            self.stream_id,
            self.socket.destination()
        );
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("stream_id", &self.stream_id)
            .field("destination", &self.socket.destination())
            .field("rx_sequence", &self.sequence(Direction::Rx))
            .field("tx_sequence", &self.sequence(Direction::Tx))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::{
        PacketHeader, PacketType, SignalingPayload, AUDIO_PREFIX_SIZE, HEADER_SIZE,
        MAX_AUDIO_FRAME,
    };
    use std::net::UdpSocket;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn receiver() -> (UdpSocket, String) {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = rx.local_addr().unwrap().to_string();
        (rx, addr)
    }

    fn alice() -> StreamMetadata {
        StreamMetadata::new("SIP/alice-1", "1000", "+15550001111", "+15550002222")
    }

    fn fork_frame(session: &StreamSession, direction: Direction, frame: &[u8]) -> ForkResult<u32> {
        let sequence = session.record_frame(direction);
        session.send_sequenced(direction, sequence, frame).map(|_| sequence)
    }

    fn recv(rx: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 65536];
        let len = rx.recv(&mut buf).unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_create_initial_state() {
        let ids = StreamIdGenerator::seeded(1);
        let session = StreamSession::create("192.168.1.100:8080", alice(), &ids).unwrap();

        assert_eq!(session.destination().to_string(), "192.168.1.100:8080");
        assert_eq!(session.sequence(Direction::Rx), 0);
        assert_eq!(session.sequence(Direction::Tx), 0);
        assert_eq!(session.metadata(), &alice());
        assert_eq!(ids.issued(), 1);
    }

    #[test]
    fn test_invalid_destination_has_no_side_effects() {
        let ids = StreamIdGenerator::seeded(1);
        let result = StreamSession::create("10.0.0.1:0", alice(), &ids);

        assert!(matches!(result, Err(ForkError::InvalidDestination(_))));
        // No stream id was consumed
        assert_eq!(ids.issued(), 0);
    }

    #[test]
    fn test_sequences_are_independent() {
        let ids = StreamIdGenerator::new();
        let session = StreamSession::create("127.0.0.1:9", alice(), &ids).unwrap();

        assert_eq!(session.record_frame(Direction::Rx), 1);
        assert_eq!(session.record_frame(Direction::Tx), 1);
        assert_eq!(session.record_frame(Direction::Rx), 2);
        assert_eq!(session.record_frame(Direction::Rx), 3);
        assert_eq!(session.sequence(Direction::Rx), 3);
        assert_eq!(session.sequence(Direction::Tx), 1);
    }

    #[test]
    fn test_sequence_wraps() {
        let ids = StreamIdGenerator::new();
        let session = StreamSession::create("127.0.0.1:9", alice(), &ids).unwrap();
        session.tx_sequence.store(u32::MAX - 1, Ordering::Relaxed);

        assert_eq!(session.record_frame(Direction::Tx), u32::MAX);
        assert_eq!(session.record_frame(Direction::Tx), 0);
        assert_eq!(session.record_frame(Direction::Tx), 1);
    }

    #[test]
    fn test_concurrent_record_frame() {
        let ids = StreamIdGenerator::new();
        let session = Arc::new(StreamSession::create("127.0.0.1:9", alice(), &ids).unwrap());

        let handles: Vec<_> = [Direction::Rx, Direction::Tx, Direction::Rx, Direction::Tx]
            .into_iter()
            .map(|dir| {
                let session = session.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        session.record_frame(dir);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(session.sequence(Direction::Rx), 2000);
        assert_eq!(session.sequence(Direction::Tx), 2000);
    }

    #[test]
    fn test_signaling_packets_share_stream_id() {
        let (rx, addr) = receiver();
        let ids = StreamIdGenerator::new();
        let session = StreamSession::create(&addr, alice(), &ids).unwrap();

        session.send_signaling(Direction::Rx).unwrap();
        session.send_signaling(Direction::Tx).unwrap();

        let first = recv(&rx);
        let second = recv(&rx);
        assert_eq!(first.len(), SIGNALING_PACKET_SIZE);
        assert_eq!(second.len(), SIGNALING_PACKET_SIZE);

        let h1 = PacketHeader::parse(&first).unwrap();
        let h2 = PacketHeader::parse(&second).unwrap();
        assert_eq!(h1.stream_id, session.stream_id());
        assert_eq!(h2.stream_id, session.stream_id());
        assert_eq!(h1.direction, Direction::Rx);
        assert_eq!(h2.direction, Direction::Tx);
        assert_eq!(&first[HEADER_SIZE..], &second[HEADER_SIZE..]);

        let payload = SignalingPayload::parse(&first[HEADER_SIZE..]).unwrap();
        assert_eq!(payload.metadata, alice());
        assert_eq!(payload.timestamp, session.created_at());
    }

    #[test]
    fn test_audio_packets() {
        let (rx, addr) = receiver();
        let ids = StreamIdGenerator::new();
        let session = StreamSession::create(&addr, alice(), &ids).unwrap();

        let frame = [0x7Fu8; 160];
        for expected in 1..=3u32 {
            assert_eq!(fork_frame(&session, Direction::Rx, &frame).unwrap(), expected);
        }

        for expected in 1..=3u32 {
            let packet = recv(&rx);
            let header = PacketHeader::parse(&packet).unwrap();
            assert_eq!(header.packet_type, PacketType::Audio);
            assert_eq!(header.packet_length, 172);
            assert_eq!(header.packet_length as usize, packet.len());
            let seq = u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]);
            assert_eq!(seq, expected);
            assert_eq!(&packet[AUDIO_PREFIX_SIZE..], &frame[..]);
        }

        assert_eq!(session.sequence(Direction::Tx), 0);
        let stats = session.stats();
        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.bytes_sent, 3 * 172);
    }

    #[test]
    fn test_oversized_frame_leaves_gap() {
        let (rx, addr) = receiver();
        let ids = StreamIdGenerator::new();
        let session = StreamSession::create(&addr, alice(), &ids).unwrap();

        let big = vec![0u8; MAX_AUDIO_FRAME + 1];
        assert!(matches!(
            fork_frame(&session, Direction::Tx, &big),
            Err(ForkError::OversizedFrame { .. })
        ));
        assert_eq!(fork_frame(&session, Direction::Tx, &[1u8; 8]).unwrap(), 2);

        let packet = recv(&rx);
        assert_eq!(u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]), 2);
        assert_eq!(session.stats().oversized_dropped, 1);
        assert_eq!(session.stats().packets_sent, 1);
    }
}
