//! Wire-format definitions for data segments and acknowledgments.
//!
//! Every datagram on the data channel is either one encoded [`Segment`]
//! (sender → receiver) or one encoded [`AckSegment`] (receiver → sender).
//! The engine only depends on the [`SegmentCodec`] trait; [`WireCodec`] is the
//! concrete format spoken by the reference receiver.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  Segment:
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload (0..=MAX_PAYLOAD_SIZE)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//!  Acknowledgment:
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Next Expected Sequence                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::error::CodecError;

/// Byte length of the sequence-number header.
pub const HEADER_LEN: usize = 4;

/// Largest payload a single segment may carry.
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Largest datagram the data channel carries.
pub const MAX_SEGMENT_SIZE: usize = HEADER_LEN + MAX_PAYLOAD_SIZE;

/// One unit of framed application data.
///
/// Immutable after creation: retransmissions reuse the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    seq: u32,
    payload: Vec<u8>,
}

impl Segment {
    pub fn new(seq: u32, payload: Vec<u8>) -> Self {
        Self { seq, payload }
    }

    /// Sequence number, assigned once by the sender.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Cumulative acknowledgment: every segment with `seq < next_expected` has
/// been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSegment {
    pub next_expected: u32,
}

impl AckSegment {
    pub fn new(next_expected: u32) -> Self {
        Self { next_expected }
    }
}

/// Datagram encoding used on the data channel.
///
/// Implementations must be stateless: the sender, the ACK loop and the timer
/// driver share one codec across threads.
pub trait SegmentCodec: Send + Sync + 'static {
    /// Largest payload [`encode_segment`](Self::encode_segment) accepts.
    fn max_payload_size(&self) -> usize;

    /// Largest datagram this codec produces or accepts.
    fn max_datagram_size(&self) -> usize;

    fn encode_segment(&self, segment: &Segment) -> Result<Vec<u8>, CodecError>;

    fn decode_segment(&self, datagram: &[u8]) -> Result<Segment, CodecError>;

    fn encode_ack(&self, ack: AckSegment) -> Vec<u8>;

    fn decode_ack(&self, datagram: &[u8]) -> Result<AckSegment, CodecError>;
}

/// The default codec: a 4-byte big-endian sequence number followed by the
/// payload; acknowledgments are the bare 4-byte sequence number.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl SegmentCodec for WireCodec {
    fn max_payload_size(&self) -> usize {
        MAX_PAYLOAD_SIZE
    }

    fn max_datagram_size(&self) -> usize {
        MAX_SEGMENT_SIZE
    }

    fn encode_segment(&self, segment: &Segment) -> Result<Vec<u8>, CodecError> {
        if segment.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge {
                len: segment.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + segment.payload.len());
        buf.extend_from_slice(&segment.seq.to_be_bytes());
        buf.extend_from_slice(&segment.payload);
        Ok(buf)
    }

    fn decode_segment(&self, datagram: &[u8]) -> Result<Segment, CodecError> {
        let (seq, payload) = split_header(datagram)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Segment::new(seq, payload.to_vec()))
    }

    fn encode_ack(&self, ack: AckSegment) -> Vec<u8> {
        ack.next_expected.to_be_bytes().to_vec()
    }

    fn decode_ack(&self, datagram: &[u8]) -> Result<AckSegment, CodecError> {
        if datagram.len() != HEADER_LEN {
            return Err(CodecError::AckLength(datagram.len()));
        }
        let (next_expected, _) = split_header(datagram)?;
        Ok(AckSegment::new(next_expected))
    }
}

fn split_header(datagram: &[u8]) -> Result<(u32, &[u8]), CodecError> {
    match datagram.split_first_chunk::<HEADER_LEN>() {
        Some((header, rest)) => Ok((u32::from_be_bytes(*header), rest)),
        None => Err(CodecError::TooShort(datagram.len())),
    }
}
