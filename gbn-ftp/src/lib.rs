//! `gbn-ftp`: reliable bulk transfer over UDP using Go-Back-N ARQ.
//!
//! # Architecture
//!
//! ```text
//!            TCP control (name / status / terminator)
//!  ┌──────────────────┐ ◀──────────────────────────▶ ┌──────────────┐
//!  │  GoBackNSender   │                              │   receiver   │
//!  │ ┌──────────────┐ │      UDP segments            │ (GbnReceiver │
//!  │ │ window+timer │─┼─────────────────────────────▶│  + server)   │
//!  │ └──────▲───────┘ │                              └──────┬───────┘
//!  │        │ on_ack  │      UDP cumulative ACKs            │
//!  │  ┌─────┴──────┐  │◀────────────────────────────────────┘
//!  │  │  ack_loop  │  │
//!  │  └────────────┘  │
//!  └──────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]   : wire format of data segments and acknowledgments
//! - [`window`]    : bounded FIFO of in-flight segments
//! - [`timer`]     : the retransmission alarm and its driver thread
//! - [`ack_loop`]  : background acknowledgment listener
//! - [`sender`]    : Go-Back-N orchestration and shared window state
//! - [`state`]     : session finite-state-machine types
//! - [`transport`] : datagram transport abstraction (UDP implementation)
//! - [`control`]   : control-channel negotiation (TCP implementation)
//! - [`session`]   : socket bootstrap for a real transfer
//! - [`config`]    : session parameters
//! - [`error`]     : error types
//! - [`receiver`]  : reference Go-Back-N receiver
//! - [`simulator`] : seeded lossy link for testing

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod ack_loop;
pub mod config;
pub mod control;
pub mod error;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod state;
pub mod timer;
pub mod transport;
pub mod window;

pub use config::SenderConfig;
pub use error::{Result, TransferError};
pub use sender::{AckOutcome, GoBackNSender, TransferStats};
pub use session::send_stream;
pub use state::SessionPhase;

/// Lock `mutex`, recovering the guard if another thread panicked with it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
