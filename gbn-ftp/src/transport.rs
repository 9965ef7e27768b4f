//! Datagram transport abstraction.
//!
//! [`DatagramTransport`] is the data channel as seen by the sender: one
//! peer, whole datagrams, no delivery guarantees.  The receive side is
//! bounded: `recv` returns `Ok(None)` once the transport's poll interval
//! elapses without traffic, which is what lets the ACK loop observe its stop
//! flag promptly.
//!
//! All methods take `&self` so one transport can be shared by the producer,
//! the ACK loop and the timer driver.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// An unreliable, connected datagram channel.
pub trait DatagramTransport: Send + Sync + 'static {
    /// Send one datagram to the peer.
    fn send(&self, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` if nothing arrived within the transport's bounded
    /// wait.  Datagrams longer than `buf` are truncated.
    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// `true` for errors that just mean "nothing arrived in time".
pub fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Bind a UDP socket to `local`, connect it to `peer`, and bound its receive
/// wait to `poll_interval`.
pub fn connect_udp(
    local: SocketAddr,
    peer: SocketAddr,
    poll_interval: Duration,
) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(local)?;
    socket.connect(peer)?;
    socket.set_read_timeout(Some(poll_interval))?;
    Ok(socket)
}

/// A connected [`UdpSocket`] is a datagram transport.
///
/// The socket must already be connected and carry a read timeout (see
/// [`connect_udp`]); without one `recv` blocks until traffic arrives.
impl DatagramTransport for UdpSocket {
    fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let n = UdpSocket::send(self, datagram)?;
        if n != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {n} of {} bytes", datagram.len()),
            ));
        }
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match UdpSocket::recv(self, buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if is_poll_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn connected_pair_exchanges_datagrams() {
        let b = UdpSocket::bind(loopback()).unwrap();
        let a = connect_udp(loopback(), b.local_addr().unwrap(), Duration::from_millis(200))
            .unwrap();
        b.connect(a.local_addr().unwrap()).unwrap();
        b.set_read_timeout(Some(Duration::from_millis(200))).unwrap();

        DatagramTransport::send(&a, b"ping").unwrap();
        let mut buf = [0u8; 16];
        let n = DatagramTransport::recv(&b, &mut buf).unwrap().unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn recv_times_out_with_none() {
        let peer = UdpSocket::bind(loopback()).unwrap();
        let a = connect_udp(loopback(), peer.local_addr().unwrap(), Duration::from_millis(30))
            .unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(DatagramTransport::recv(&a, &mut buf).unwrap(), None);
    }

    #[test]
    fn poll_timeout_classification() {
        assert!(is_poll_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_poll_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_poll_timeout(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }
}
