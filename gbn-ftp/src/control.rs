//! Control channel: session rendezvous and end-of-transmission signalling.
//!
//! The sender speaks three messages over a reliable, ordered byte stream:
//!
//! ```text
//!  sender                                   receiver
//!    │── name_len (u16 BE) + name (UTF-8) ───▶│
//!    │◀──────────── status (i8) ──────────────│   0 = proceed
//!    │          … data channel transfer …     │
//!    │──────────── terminator (0u8) ─────────▶│
//! ```
//!
//! [`ControlChannel`] is the seam the sender depends on; [`TcpControl`]
//! implements it over any `Read + Write` stream (a `TcpStream` in
//! production, an in-memory buffer in tests).

use std::io::{self, Read, Write};

use crate::error::{Result, TransferError};

/// Handshake status meaning "proceed with the transfer".
pub const STATUS_PROCEED: i8 = 0;

/// Byte written after the last segment is acknowledged.
pub const END_OF_TRANSMISSION: u8 = 0;

/// Session negotiation collaborator.
pub trait ControlChannel {
    /// Announce `object_name` and wait for the receiver's verdict.
    ///
    /// Returns `Ok(())` only for [`STATUS_PROCEED`]; any other status is
    /// [`TransferError::HandshakeRejected`].
    fn negotiate(&mut self, object_name: &str) -> Result<()>;

    /// Signal end-of-transmission.
    fn finish(&mut self) -> Result<()>;
}

/// Frame `name` as a big-endian `u16` length followed by its UTF-8 bytes.
pub fn encode_object_name(name: &str) -> Result<Vec<u8>> {
    let len = u16::try_from(name.len()).map_err(|_| {
        TransferError::InvalidObjectName(format!(
            "{} bytes exceeds the {}-byte limit",
            name.len(),
            u16::MAX
        ))
    })?;
    let mut buf = Vec::with_capacity(2 + name.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    Ok(buf)
}

/// [`ControlChannel`] over a blocking byte stream.
#[derive(Debug)]
pub struct TcpControl<S> {
    stream: S,
}

impl<S: Read + Write> TcpControl<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn read_status(&mut self) -> io::Result<i8> {
        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte)?;
        Ok(i8::from_be_bytes(byte))
    }
}

impl<S: Read + Write> ControlChannel for TcpControl<S> {
    fn negotiate(&mut self, object_name: &str) -> Result<()> {
        let frame = encode_object_name(object_name)?;
        self.stream
            .write_all(&frame)
            .and_then(|()| self.stream.flush())
            .map_err(TransferError::Control)?;

        let code = self.read_status().map_err(TransferError::Control)?;
        if code == STATUS_PROCEED {
            log::debug!("[gbn:ctl] receiver accepted {object_name:?}");
            Ok(())
        } else {
            Err(TransferError::HandshakeRejected { code })
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.stream
            .write_all(&[END_OF_TRANSMISSION])
            .and_then(|()| self.stream.flush())
            .map_err(TransferError::Control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Scripted peer: reads come from `input`, writes land in `output`.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn replying(bytes: &[u8]) -> Self {
            Self {
                input: Cursor::new(bytes.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn name_framing() {
        assert_eq!(encode_object_name("ab").unwrap(), [0, 2, b'a', b'b']);
        assert_eq!(encode_object_name("").unwrap(), [0, 0]);
    }

    #[test]
    fn oversized_name_rejected() {
        let name = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            encode_object_name(&name),
            Err(TransferError::InvalidObjectName(_))
        ));
    }

    #[test]
    fn proceed_status_accepts() {
        let mut ctl = TcpControl::new(Scripted::replying(&[0]));
        ctl.negotiate("file.bin").unwrap();
        assert_eq!(ctl.get_ref().output, encode_object_name("file.bin").unwrap());
    }

    #[test]
    fn nonzero_status_rejects_with_code() {
        let mut ctl = TcpControl::new(Scripted::replying(&[0xff]));
        match ctl.negotiate("missing") {
            Err(TransferError::HandshakeRejected { code }) => assert_eq!(code, -1),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn closed_stream_is_control_error() {
        let mut ctl = TcpControl::new(Scripted::replying(&[]));
        assert!(matches!(ctl.negotiate("f"), Err(TransferError::Control(_))));
    }

    #[test]
    fn finish_writes_terminator() {
        let mut ctl = TcpControl::new(Scripted::replying(&[0]));
        ctl.negotiate("f").unwrap();
        ctl.finish().unwrap();
        let out = ctl.into_inner().output;
        assert_eq!(out.last(), Some(&END_OF_TRANSMISSION));
        assert_eq!(out.len(), 2 + 1 + 1);
    }
}
