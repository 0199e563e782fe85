//! UDP transport for negotiation datagrams.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use keyneg_session::PacketSender;
use keyneg_types::{NegotiateError, NegotiateResult};
use keyneg_wire::NegotiationPacket;

/// Receive buffer size; larger datagrams are truncated and fail to decode.
const RECV_BUFFER_SIZE: usize = 4096;

/// Non-blocking UDP socket bound to the configured port.
///
/// Sending is `&self` and thread-safe: the kernel delivers each datagram
/// atomically, the internal lock only guards the shared encode buffer.
pub struct UdpTransport {
    socket: UdpSocket,
    send_buf: Mutex<Vec<u8>>,
}

impl UdpTransport {
    /// Create the socket: IPv4 datagram, address reuse, non-blocking, bound
    /// to INADDR_ANY at `port`.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
        Ok(Self {
            socket: socket.into(),
            send_buf: Mutex::new(Vec::with_capacity(RECV_BUFFER_SIZE)),
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait for a datagram for at most `timeout` and decode it.
    ///
    /// Returns `Timeout` when nothing became readable, `InvalidParam` when a
    /// datagram failed to decode and `SocketError` on transport failures.
    pub fn recv_packet(
        &self,
        timeout: Duration,
    ) -> NegotiateResult<(NegotiationPacket, SocketAddrV4)> {
        self.wait_readable(timeout)?;

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (len, src) = match self.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(NegotiateError::Timeout)
            }
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                return Err(NegotiateError::SocketError);
            }
        };

        let src = match src {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => {
                tracing::debug!("dropping datagram from non-IPv4 source");
                return Err(NegotiateError::InvalidParam);
            }
        };

        match NegotiationPacket::decode(&buf[..len]) {
            Ok(packet) => Ok((packet, src)),
            Err(e) => {
                tracing::debug!(peer = %src, len, error = %e, "dropping malformed datagram");
                Err(NegotiateError::InvalidParam)
            }
        }
    }

    /// Block until the socket is readable or the timeout elapses.
    fn wait_readable(&self, timeout: Duration) -> NegotiateResult<()> {
        let mut fds = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let ready = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        match ready {
            0 => Err(NegotiateError::Timeout),
            n if n > 0 => Ok(()),
            _ => {
                let err = io::Error::last_os_error();
                // EINTR (the shutdown signal) becomes Timeout so the receive
                // loop re-checks its running flag.
                if err.kind() == io::ErrorKind::Interrupted {
                    Err(NegotiateError::Timeout)
                } else {
                    tracing::warn!(error = %err, "poll failed");
                    Err(NegotiateError::SocketError)
                }
            }
        }
    }
}

impl PacketSender for UdpTransport {
    fn send_packet(&self, packet: &NegotiationPacket, peer: SocketAddrV4) -> NegotiateResult<()> {
        let mut buf = self.send_buf.lock();
        buf.clear();
        packet.encode(&mut buf);
        match self.socket.send_to(&buf, peer) {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "send_to failed");
                Err(NegotiateError::SocketError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyneg_wire::PacketType;

    fn local_port(transport: &UdpTransport) -> SocketAddrV4 {
        match transport.local_addr().unwrap() {
            SocketAddr::V4(v4) => SocketAddrV4::new(Ipv4Addr::LOCALHOST, v4.port()),
            SocketAddr::V6(_) => unreachable!("transport binds IPv4"),
        }
    }

    #[test]
    fn test_send_and_recv_roundtrip() {
        let a = UdpTransport::bind(0).unwrap();
        let b = UdpTransport::bind(0).unwrap();

        let packet = NegotiationPacket::new(PacketType::Random1, 456, &[7u8; 32]);
        a.send_packet(&packet, local_port(&b)).unwrap();

        let (received, src) = b.recv_packet(Duration::from_secs(1)).unwrap();
        assert_eq!(received, packet);
        assert_eq!(src.port(), local_port(&a).port());
    }

    #[test]
    fn test_recv_times_out_when_idle() {
        let transport = UdpTransport::bind(0).unwrap();
        assert_eq!(
            transport
                .recv_packet(Duration::from_millis(20))
                .unwrap_err(),
            NegotiateError::Timeout
        );
    }

    #[test]
    fn test_recv_rejects_malformed_datagram() {
        let transport = UdpTransport::bind(0).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"not a packet", local_port(&transport)).unwrap();

        assert_eq!(
            transport
                .recv_packet(Duration::from_secs(1))
                .unwrap_err(),
            NegotiateError::InvalidParam
        );
    }
}
