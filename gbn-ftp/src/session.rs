//! Session bootstrap over real sockets.
//!
//! The control connection is TCP; the data channel is a UDP socket bound to
//! the control connection's local address and connected to its peer, so the
//! receiver can pair the two by address.

use std::io::Read;
use std::net::{SocketAddr, TcpStream, UdpSocket};

use crate::config::SenderConfig;
use crate::control::TcpControl;
use crate::error::{Result, TransferError};
use crate::sender::{GoBackNSender, TransferStats};
use crate::transport::connect_udp;

/// Sockets for one session, ready for [`GoBackNSender::transfer`].
#[derive(Debug)]
pub struct SessionSockets {
    pub control: TcpControl<TcpStream>,
    pub data: UdpSocket,
}

/// Connect the control stream to `server` and open the paired data socket.
pub fn connect(server: SocketAddr, config: &SenderConfig) -> Result<SessionSockets> {
    let stream = TcpStream::connect_timeout(&server, config.handshake_timeout)
        .map_err(|source| resource("control connection", source))?;
    stream
        .set_read_timeout(Some(config.handshake_timeout))
        .map_err(|source| resource("control connection", source))?;
    stream.set_nodelay(true).map_err(|source| resource("control connection", source))?;

    let local = stream
        .local_addr()
        .map_err(|source| resource("control connection", source))?;
    let peer = stream
        .peer_addr()
        .map_err(|source| resource("control connection", source))?;
    let data = connect_udp(local, peer, config.ack_poll_interval)
        .map_err(|source| resource("data socket", source))?;

    log::debug!("[gbn] control {local} → {peer}, data socket bound to {local}");
    Ok(SessionSockets {
        control: TcpControl::new(stream),
        data,
    })
}

/// Transfer everything `source` yields to the receiver at `server` under
/// `object_name`.
pub fn send_stream<R: Read>(
    server: SocketAddr,
    object_name: &str,
    source: R,
    config: SenderConfig,
) -> Result<TransferStats> {
    config.validate(&crate::segment::WireCodec)?;
    let SessionSockets { mut control, data } = connect(server, &config)?;
    let mut sender = GoBackNSender::new(data, config)?;
    sender.transfer(object_name, source, &mut control)
}

fn resource(what: &'static str, source: std::io::Error) -> TransferError {
    TransferError::Resource { what, source }
}
