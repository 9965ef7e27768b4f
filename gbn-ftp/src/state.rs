//! Sender session finite-state machine (FSM) types.
//!
//! Transitions are driven by [`crate::sender::GoBackNSender::transfer`];
//! this module only names the states and the legal edges between them.
//!
//! ```text
//!  IDLE ──negotiate──▶ HANDSHAKING ──proceed──▶ TRANSMITTING
//!                          │                         │ source exhausted
//!                          │ rejected / I/O error    ▼
//!                          │                      DRAINING ──window empty──▶ CLOSED
//!                          └───────────────────────────────────────────────▶ CLOSED
//! ```
//!
//! Any fatal error in `TRANSMITTING` or `DRAINING` also ends in `CLOSED`
//! after teardown.

/// All possible states of a sender session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Constructed; nothing has been exchanged yet.
    #[default]
    Idle,
    /// Waiting for the receiver to confirm the object name.
    Handshaking,
    /// Reading the source and filling the window.
    Transmitting,
    /// Source exhausted; waiting for the window to empty.
    Draining,
    /// Session over, successfully or not.  Terminal.
    Closed,
}

impl SessionPhase {
    /// `true` when `self → next` is an edge of the FSM.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Handshaking)
                | (Handshaking, Transmitting)
                | (Transmitting, Draining)
                | (Handshaking | Transmitting | Draining, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionPhase::Closed
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Handshaking => "HANDSHAKING",
            Self::Transmitting => "TRANSMITTING",
            Self::Draining => "DRAINING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
