//! Background acknowledgment listener.
//!
//! [`AckReceiverLoop`] owns one thread for the lifetime of a session.  Each
//! iteration blocks in [`DatagramTransport::recv`] for at most the transport's
//! poll interval, decodes an [`AckSegment`] and hands it to the sink.  Between
//! iterations it checks a cooperative stop flag, so stopping takes at most one
//! poll interval and never interrupts a sink call.
//!
//! | receive outcome          | action                                  |
//! |--------------------------|-----------------------------------------|
//! | datagram, decodes        | `sink.on_ack(ack)`                      |
//! | datagram, malformed      | log at debug, continue                  |
//! | poll timeout / interrupt | re-check stop flag, continue            |
//! | connection refused       | log at warn, continue                   |
//! | any other I/O error      | `sink.on_fatal(err)`, thread exits      |

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::TransferError;
use crate::segment::{AckSegment, SegmentCodec};
use crate::transport::{is_poll_timeout, DatagramTransport};

/// Receiver of decoded acknowledgments.
pub trait AckSink: Send + Sync + 'static {
    fn on_ack(&self, ack: AckSegment);

    /// The data channel is broken; the session must abort with `error`.
    fn on_fatal(&self, error: TransferError);
}

/// Handle to the running listener thread.
#[derive(Debug)]
pub struct AckReceiverLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AckReceiverLoop {
    /// Start listening on `transport`, forwarding into `sink`.
    pub fn spawn<T, C, S>(transport: Arc<T>, codec: Arc<C>, sink: Arc<S>) -> io::Result<Self>
    where
        T: DatagramTransport,
        C: SegmentCodec,
        S: AckSink,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("gbn-ack".into())
            .spawn(move || listen(&*transport, &*codec, &*sink, &flag))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the thread to exit at its next iteration boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// `true` once the thread has exited (stopped or failed).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[gbn:ack] listener thread panicked");
            }
        }
    }
}

impl Drop for AckReceiverLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listen<T, C, S>(transport: &T, codec: &C, sink: &S, stop: &AtomicBool)
where
    T: DatagramTransport,
    C: SegmentCodec,
    S: AckSink,
{
    let mut buf = vec![0u8; codec.max_datagram_size()];
    while !stop.load(Ordering::Acquire) {
        match transport.recv(&mut buf) {
            Ok(None) => continue,
            Ok(Some(n)) => match codec.decode_ack(&buf[..n]) {
                Ok(ack) => sink.on_ack(ack),
                Err(e) => log::debug!("[gbn:ack] dropping malformed datagram: {e}"),
            },
            Err(e) if is_poll_timeout(&e) => continue,
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                log::warn!("[gbn:ack] receiver port unreachable: {e}");
            }
            Err(e) => {
                log::error!("[gbn:ack] data channel failed: {e}");
                sink.on_fatal(TransferError::Transport(e));
                return;
            }
        }
    }
    log::trace!("[gbn:ack] listener stopped");
}
