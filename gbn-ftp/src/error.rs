//! Error types for the transfer engine.
//!
//! [`TransferError`] is the single failure type a session reports.  It is
//! returned exactly once, carrying the precipitating cause; everything that is
//! merely a per-datagram anomaly (a receive timeout, one undecodable datagram,
//! a stale acknowledgment) is logged and absorbed instead of surfacing here.

use std::io;

use thiserror::Error;

use crate::state::SessionPhase;

/// Errors raised while encoding or decoding a datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Datagram shorter than the fixed sequence-number header.
    #[error("datagram too short: {0} byte(s)")]
    TooShort(usize),
    /// Payload exceeds what one datagram may carry.
    #[error("payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },
    /// An acknowledgment datagram must be exactly one sequence number.
    #[error("acknowledgment datagram has {0} bytes, expected 4")]
    AckLength(usize),
}

/// Everything that can abort a transfer session.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Send/receive failure on the data channel that indicates the channel
    /// itself is broken.
    #[error("data channel I/O error: {0}")]
    Transport(#[source] io::Error),

    /// Read/write failure on the control channel.
    #[error("control channel I/O error: {0}")]
    Control(#[source] io::Error),

    /// The receiver answered the handshake with a nonzero status.
    #[error("receiver rejected the session with status {code}")]
    HandshakeRejected { code: i8 },

    /// The object identifier cannot be framed on the control channel.
    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    /// Reading the source stream failed.
    #[error("source read error: {0}")]
    Source(#[source] io::Error),

    /// A socket or thread could not be acquired at startup.
    #[error("could not acquire {what}: {source}")]
    Resource {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// Configuration rejected by [`crate::config::SenderConfig::validate`].
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A segment could not be framed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The session ran past the last representable sequence number.
    #[error("sequence number space exhausted")]
    SequenceSpaceExhausted,

    /// `max_timeouts` consecutive timeouts fired without progress.
    #[error("peer unresponsive after {timeouts} consecutive timeouts")]
    PeerUnresponsive { timeouts: u32 },

    /// A sender is single-use; `transfer` was called outside `IDLE`.
    #[error("sender is {0}, expected IDLE")]
    InvalidState(SessionPhase),

    /// The session was cancelled while an operation was blocked.
    #[error("session cancelled")]
    Cancelled,
}

impl TransferError {
    /// `true` for failures caused by the peer or the network rather than by
    /// local misuse.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Control(_)
                | Self::HandshakeRejected { .. }
                | Self::PeerUnresponsive { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransferError>;
