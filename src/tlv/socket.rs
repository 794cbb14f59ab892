//! Send-only UDP socket for forkstream packets.
//!
//! Each session owns exactly one `ForkSocket`, aimed at one destination for
//! its whole lifetime. Sends take `&self`, so the RX and TX paths of a call
//! can transmit concurrently through the same descriptor.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::IoSlice;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{ForkError, ForkResult};

/// Requested kernel send buffer (best effort)
pub const SEND_BUFFER_BYTES: usize = 256 * 1024;

/// Connectionless UDP socket bound to a single destination.
pub struct ForkSocket {
    /// The underlying socket
    socket: Socket,
    /// Destination, in socket2 form for send_to
    dest: SockAddr,
    /// Destination as given
    dest_v4: SocketAddrV4,
}

impl ForkSocket {
    /// Open a non-blocking UDP socket that sends to `destination`.
    pub fn open(destination: SocketAddrV4) -> ForkResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // A send must never stall the audio path
        socket.set_nonblocking(true)?;

        let _ = socket.set_send_buffer_size(SEND_BUFFER_BYTES);

        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket.bind(&local.into())?;

        Ok(ForkSocket {
            socket,
            dest: destination.into(),
            dest_v4: destination,
        })
    }

    /// Send one datagram.
    pub fn send(&self, data: &[u8]) -> ForkResult<usize> {
        let sent = self.socket.send_to(data, &self.dest)?;
        check_complete(sent, data.len())
    }

    /// Send `header` and `payload` as one datagram without concatenating them.
    pub fn send_vectored(&self, header: &[u8], payload: &[u8]) -> ForkResult<usize> {
        let bufs = [IoSlice::new(header), IoSlice::new(payload)];
        let sent = self.socket.send_to_vectored(&bufs, &self.dest)?;
        check_complete(sent, header.len() + payload.len())
    }

    /// Destination this socket sends to.
    pub fn destination(&self) -> SocketAddrV4 {
        self.dest_v4
    }
}

fn check_complete(sent: usize, expected: usize) -> ForkResult<usize> {
    if sent == expected {
        Ok(sent)
    } else {
        Err(ForkError::PartialSend { sent, expected })
    }
}

impl std::fmt::Debug for ForkSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkSocket")
            .field("destination", &self.dest_v4)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn receiver() -> (UdpSocket, SocketAddrV4) {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = match rx.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };
        (rx, addr)
    }

    #[test]
    fn test_socket_creation() {
        let remote = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), 8080);
        let socket = ForkSocket::open(remote).unwrap();
        assert_eq!(socket.destination(), remote);
    }

    #[test]
    fn test_send_single_datagram() {
        let (rx, addr) = receiver();
        let socket = ForkSocket::open(addr).unwrap();

        assert_eq!(socket.send(b"hello").unwrap(), 5);

        let mut buf = [0u8; 64];
        let len = rx.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
    }

    #[test]
    fn test_vectored_send_is_one_datagram() {
        let (rx, addr) = receiver();
        let socket = ForkSocket::open(addr).unwrap();

        let header = [1u8, 2, 3, 4];
        let payload = [9u8; 160];
        assert_eq!(socket.send_vectored(&header, &payload).unwrap(), 164);

        let mut buf = [0u8; 512];
        let len = rx.recv(&mut buf).unwrap();
        assert_eq!(len, 164);
        assert_eq!(&buf[..4], &header);
        assert_eq!(&buf[4..len], &payload[..]);
    }
}
