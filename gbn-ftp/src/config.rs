//! Session configuration.
//!
//! [`SenderConfig`] is consumed when a session is built and is immutable
//! afterwards.  The CLI maps its flags onto it; library users start from
//! [`SenderConfig::default`] and override fields.

use std::time::Duration;

use crate::error::{Result, TransferError};
use crate::segment::{SegmentCodec, MAX_PAYLOAD_SIZE};

/// Default Go-Back-N window, in segments.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default retransmission interval.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// How long the ACK loop blocks in one receive before re-checking its stop
/// flag.
pub const DEFAULT_ACK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read timeout on the control channel while waiting for the handshake status.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adjustable session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Maximum number of segments in flight (N ≥ 1).
    pub window_size: usize,
    /// Fixed retransmission interval (> 0).  No back-off is applied.
    pub timeout: Duration,
    /// Payload bytes per segment; at most the codec's maximum.
    pub max_payload_size: usize,
    /// Bounded wait of one ACK-loop receive.
    pub ack_poll_interval: Duration,
    /// Bounded wait for the receiver's handshake status.
    pub handshake_timeout: Duration,
    /// Give up after this many consecutive timeouts without progress.
    /// `None` retransmits indefinitely.
    pub max_timeouts: Option<u32>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: DEFAULT_TIMEOUT,
            max_payload_size: MAX_PAYLOAD_SIZE,
            ack_poll_interval: DEFAULT_ACK_POLL_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_timeouts: None,
        }
    }
}

impl SenderConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_ack_poll_interval(mut self, interval: Duration) -> Self {
        self.ack_poll_interval = interval;
        self
    }

    pub fn with_max_timeouts(mut self, limit: u32) -> Self {
        self.max_timeouts = Some(limit);
        self
    }

    /// Check the configuration against `codec`.
    pub fn validate(&self, codec: &dyn SegmentCodec) -> Result<()> {
        if self.window_size == 0 {
            return Err(invalid("window size must be at least 1 segment"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("retransmission timeout must be positive"));
        }
        if self.ack_poll_interval.is_zero() {
            return Err(invalid("ACK poll interval must be positive"));
        }
        if self.max_payload_size == 0 {
            return Err(invalid("maximum payload size must be positive"));
        }
        if self.max_payload_size > codec.max_payload_size() {
            return Err(invalid(format!(
                "maximum payload size {} exceeds codec limit {}",
                self.max_payload_size,
                codec.max_payload_size()
            )));
        }
        if self.max_timeouts == Some(0) {
            return Err(invalid("max_timeouts must be at least 1 when set"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> TransferError {
    TransferError::InvalidConfig(msg.into())
}
