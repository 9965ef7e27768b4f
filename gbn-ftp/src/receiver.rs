//! Reference Go-Back-N receiver.
//!
//! - [`GbnReceiver`] is the receive-side state machine.  Only the segment
//!   with `seq == next_expected` is accepted; anything out of order or
//!   duplicated is discarded.  After every segment, accepted or not, the
//!   caller answers with the cumulative [`GbnReceiver::ack`].
//! - [`serve_datagrams`] runs that machine over any blocking
//!   [`DatagramTransport`] until told to stop (used with the simulator).
//! - [`ReceiverServer`] is the tokio server behind `gbn-ftp receive`: it
//!   accepts one control connection at a time, reads the object name,
//!   answers with a status, then receives segments on the UDP socket sharing
//!   the listener's port until the terminator byte arrives.
//!
//! Received data is buffered in memory.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use crate::control::{END_OF_TRANSMISSION, STATUS_PROCEED};
use crate::error::{Result, TransferError};
use crate::segment::{AckSegment, Segment, SegmentCodec, WireCodec};
use crate::transport::DatagramTransport;

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// Go-Back-N receive-side state for one session.
#[derive(Debug, Default)]
pub struct GbnReceiver {
    next_expected: u32,
    data: Vec<u8>,
    accepted: u64,
    discarded: u64,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an inbound segment.  Returns `true` if it was the next one in
    /// order and its payload was appended.
    pub fn on_segment(&mut self, segment: &Segment) -> bool {
        let next = match self.next_expected.checked_add(1) {
            Some(next) if segment.seq() == self.next_expected => next,
            _ => {
                self.discarded += 1;
                return false;
            }
        };
        self.data.extend_from_slice(segment.payload());
        self.next_expected = next;
        self.accepted += 1;
        true
    }

    /// Cumulative acknowledgment for everything accepted so far.
    pub fn ack(&self) -> AckSegment {
        AckSegment::new(self.next_expected)
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Segments accepted and discarded, in that order.
    pub fn counts(&self) -> (u64, u64) {
        (self.accepted, self.discarded)
    }
}

// ---------------------------------------------------------------------------
// Blocking loop
// ---------------------------------------------------------------------------

/// Receive segments from `transport` into `receiver`, acknowledging each,
/// until `stop` is set.
///
/// Undecodable datagrams are dropped.  Transport errors other than poll
/// timeouts end the loop.
pub fn serve_datagrams<T, C>(
    transport: &T,
    codec: &C,
    receiver: &mut GbnReceiver,
    stop: &AtomicBool,
) -> io::Result<()>
where
    T: DatagramTransport + ?Sized,
    C: SegmentCodec,
{
    let mut buf = vec![0u8; codec.max_datagram_size()];
    while !stop.load(Ordering::Acquire) {
        let Some(n) = transport.recv(&mut buf)? else {
            continue;
        };
        let segment = match codec.decode_segment(&buf[..n]) {
            Ok(segment) => segment,
            Err(e) => {
                log::debug!("[gbn:rx] dropping malformed datagram: {e}");
                continue;
            }
        };
        receiver.on_segment(&segment);
        transport.send(&codec.encode_ack(receiver.ack()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ReceiverServer
// ---------------------------------------------------------------------------

/// One object received in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedObject {
    pub name: String,
    pub data: Vec<u8>,
}

/// Outcome of [`ReceiverServer::accept_one`].
#[derive(Debug)]
pub enum Session {
    Received(ReceivedObject),
    /// The name was refused with this status.
    Rejected { name: String, status: i8 },
}

/// Single-session-at-a-time Go-Back-N receiver on a TCP+UDP port pair.
#[derive(Debug)]
pub struct ReceiverServer {
    listener: TcpListener,
    data: UdpSocket,
    codec: WireCodec,
    ack_loss: Option<(f64, StdRng)>,
}

impl ReceiverServer {
    /// Bind the control listener to `addr` and the data socket to the same
    /// resolved address.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransferError::Resource {
                what: "control listener",
                source,
            })?;
        let local = listener.local_addr().map_err(TransferError::Control)?;
        let data = UdpSocket::bind(local)
            .await
            .map_err(|source| TransferError::Resource {
                what: "data socket",
                source,
            })?;
        log::info!("[gbn:rx] listening on {local}");
        Ok(Self {
            listener,
            data,
            codec: WireCodec,
            ack_loss: None,
        })
    }

    /// Drop each outgoing acknowledgment with probability `rate`, from a
    /// generator seeded with `seed`.
    pub fn with_ack_loss(mut self, rate: f64, seed: u64) -> Self {
        self.ack_loss = Some((rate.clamp(0.0, 1.0), StdRng::seed_from_u64(seed)));
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve one session.
    ///
    /// `admit` decides the handshake status for the announced name;
    /// anything but [`STATUS_PROCEED`] ends the session right after the
    /// status is written.
    pub async fn accept_one<F>(&mut self, admit: F) -> Result<Session>
    where
        F: FnOnce(&str) -> i8,
    {
        let (mut control, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransferError::Control)?;
        let name = read_name(&mut control).await?;
        let status = admit(&name);
        control
            .write_all(&status.to_be_bytes())
            .await
            .map_err(TransferError::Control)?;
        if status != STATUS_PROCEED {
            log::info!("[gbn:rx] rejected {name:?} from {peer} with status {status}");
            return Ok(Session::Rejected { name, status });
        }
        log::info!("[gbn:rx] receiving {name:?} from {peer}");

        let receiver = self.receive_segments(&mut control, peer).await?;
        let (accepted, discarded) = receiver.counts();
        log::info!(
            "[gbn:rx] {name:?} complete: {} byte(s), {accepted} segment(s), {discarded} discarded",
            receiver.data().len()
        );
        Ok(Session::Received(ReceivedObject {
            name,
            data: receiver.into_data(),
        }))
    }

    async fn receive_segments(
        &mut self,
        control: &mut TcpStream,
        peer: SocketAddr,
    ) -> Result<GbnReceiver> {
        let mut receiver = GbnReceiver::new();
        let mut buf = vec![0u8; self.codec.max_datagram_size()];
        let mut terminator = [0u8; 1];

        loop {
            tokio::select! {
                result = self.data.recv_from(&mut buf) => {
                    let (n, from) = result.map_err(TransferError::Transport)?;
                    if from != peer {
                        log::debug!("[gbn:rx] ignoring datagram from {from}");
                        continue;
                    }
                    let segment = match self.codec.decode_segment(&buf[..n]) {
                        Ok(segment) => segment,
                        Err(e) => {
                            log::debug!("[gbn:rx] dropping malformed datagram: {e}");
                            continue;
                        }
                    };
                    let accepted = receiver.on_segment(&segment);
                    log::trace!(
                        "[gbn:rx] ← DATA seq={} accepted={accepted}; → ACK {}",
                        segment.seq(),
                        receiver.next_expected()
                    );
                    if self.drop_ack() {
                        continue;
                    }
                    let ack = self.codec.encode_ack(receiver.ack());
                    self.data
                        .send_to(&ack, from)
                        .await
                        .map_err(TransferError::Transport)?;
                }
                result = control.read(&mut terminator) => {
                    match result.map_err(TransferError::Control)? {
                        0 => {
                            return Err(TransferError::Control(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "control connection closed before end-of-transmission",
                            )));
                        }
                        _ if terminator[0] == END_OF_TRANSMISSION => return Ok(receiver),
                        _ => log::debug!("[gbn:rx] unexpected control byte {}", terminator[0]),
                    }
                }
            }
        }
    }

    fn drop_ack(&mut self) -> bool {
        match &mut self.ack_loss {
            Some((rate, rng)) => rng.random_bool(*rate),
            None => false,
        }
    }
}

async fn read_name(control: &mut TcpStream) -> Result<String> {
    let len = control.read_u16().await.map_err(TransferError::Control)?;
    let mut bytes = vec![0u8; usize::from(len)];
    control
        .read_exact(&mut bytes)
        .await
        .map_err(TransferError::Control)?;
    String::from_utf8(bytes).map_err(|e| TransferError::InvalidObjectName(e.to_string()))
}
