//! Retransmission timer.
//!
//! Go-Back-N keeps one logical alarm, bound to the oldest unacknowledged
//! segment.  This module provides:
//! - [`RetransmissionTimer`]: the alarm's state (deadline + bound segment).
//!   It lives inside the owner's lock-guarded state, so arming and cancelling
//!   happen atomically with respect to window mutation.
//! - [`spawn_driver`]: a background thread that sleeps on a [`Condvar`]
//!   paired with the owner's mutex and invokes [`TimerHost::on_expiry`] when
//!   the deadline passes, still holding the lock.
//!
//! The driver consumes the alarm before invoking the callback, and only after
//! re-acquiring the lock.  A cancel or re-arm that got the lock first always
//! wins, so a timeout can never act on stale window state.
//!
//! The interval is flat: no back-off, no RTT estimation.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::lock_unpoisoned;

// ---------------------------------------------------------------------------
// RetransmissionTimer
// ---------------------------------------------------------------------------

/// State of the single re-armable retransmission alarm.
#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    interval: Duration,
    deadline: Option<Instant>,
    bound_to: Option<u32>,
}

impl RetransmissionTimer {
    /// A disarmed timer that arms for `interval` at a time.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            bound_to: None,
        }
    }

    /// The fixed retransmission interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm for one full interval, bound to segment `seq`.
    ///
    /// Replaces any pending alarm.
    pub fn arm(&mut self, seq: u32) {
        self.arm_for(seq, self.interval);
    }

    /// Arm for `duration`, bound to segment `seq`, replacing any pending alarm.
    pub fn arm_for(&mut self, seq: u32, duration: Duration) {
        self.deadline = Some(Instant::now() + duration);
        self.bound_to = Some(seq);
    }

    /// Abort a pending alarm.  No-op when nothing is armed.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.bound_to = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Segment the pending alarm is bound to.
    pub fn bound_to(&self) -> Option<u32> {
        self.bound_to
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// If the alarm is due at `now`, disarm it and return the segment it was
    /// bound to.
    pub fn take_expired(&mut self, now: Instant) -> Option<u32> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.bound_to.take()
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Owner of a [`RetransmissionTimer`] that a driver thread can service.
///
/// Whoever arms or cancels the timer, or flips the shut-down flag, must
/// notify [`signal`](Self::signal) afterwards so the driver re-evaluates its
/// deadline.
pub trait TimerHost: Send + Sync + 'static {
    type State;

    /// The mutex guarding the timer and everything it protects.
    fn state(&self) -> &Mutex<Self::State>;

    /// Condition variable paired with [`state`](Self::state).
    fn signal(&self) -> &Condvar;

    fn timer(state: &mut Self::State) -> &mut RetransmissionTimer;

    /// When `true` the driver exits.
    fn is_shut_down(state: &Self::State) -> bool;

    /// Called with the lock held when the alarm bound to `bound_to` expires.
    fn on_expiry(&self, state: &mut Self::State, bound_to: u32);
}

/// Start the driver thread for `host`.
pub fn spawn_driver<H: TimerHost>(host: Arc<H>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("gbn-timer".into())
        .spawn(move || drive(&*host))
}

fn drive<H: TimerHost>(host: &H) {
    let mut state = lock_unpoisoned(host.state());
    loop {
        if H::is_shut_down(&state) {
            log::trace!("[gbn:timer] driver exiting");
            return;
        }

        let now = Instant::now();
        if let Some(seq) = H::timer(&mut state).take_expired(now) {
            host.on_expiry(&mut state, seq);
            continue;
        }

        state = match H::timer(&mut state).deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(now);
                host.signal()
                    .wait_timeout(state, wait)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => host
                .signal()
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
