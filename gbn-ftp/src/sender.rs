//! Go-Back-N sender.
//!
//! [`GoBackNSender`] drives one transfer session end to end: handshake on the
//! control channel, framing the source into segments, keeping up to `N` of
//! them in flight, and signalling completion once every segment has been
//! cumulatively acknowledged.
//!
//! # Concurrency
//!
//! Three threads of control touch the window:
//!
//! ```text
//!   producer (caller of transfer) ──┐
//!   ACK listener ("gbn-ack")      ──┼──▶ Mutex<SenderState> { window, timer, … }
//!   timer driver ("gbn-timer")    ──┘        │
//!                                            ├── space:        window has room
//!                                            ├── drained:      window is empty
//!                                            └── timer_signal: timer re-armed
//! ```
//!
//! Enqueue-on-send, release-on-ack, retransmit-on-timeout and every timer
//! arm/cancel run inside the same critical section, so a timeout can never
//! observe a half-applied acknowledgment.  The producer never polls: it sleeps
//! on `space` until an acknowledgment frees a slot or the session fails.

use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::ack_loop::{AckReceiverLoop, AckSink};
use crate::config::SenderConfig;
use crate::control::ControlChannel;
use crate::error::{Result, TransferError};
use crate::lock_unpoisoned;
use crate::segment::{AckSegment, Segment, SegmentCodec, WireCodec};
use crate::state::SessionPhase;
use crate::timer::{self, RetransmissionTimer, TimerHost};
use crate::transport::DatagramTransport;
use crate::window::{InFlight, SlidingWindowQueue};

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// Counters accumulated over one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Distinct segments framed and transmitted (first transmissions only).
    pub segments_sent: u64,
    /// Payload bytes across those segments.
    pub bytes_sent: u64,
    /// Retransmission timeouts that fired with a non-empty window.
    pub timeouts: u64,
    /// Datagrams re-sent because of timeouts.
    pub datagrams_retransmitted: u64,
    pub acks_accepted: u64,
    pub acks_ignored: u64,
}

impl std::fmt::Display for TransferStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} segment(s) / {} byte(s) sent, {} timeout(s), {} retransmitted, \
             acks {} accepted / {} ignored",
            self.segments_sent,
            self.bytes_sent,
            self.timeouts,
            self.datagrams_retransmitted,
            self.acks_accepted,
            self.acks_ignored
        )
    }
}

/// What [`GoBackNSender::on_ack`] did with an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Duplicate, stale, premature or arrived with nothing in flight.
    Ignored,
    /// Released `released` segments; some remain in flight.
    Advanced { released: usize },
    /// Released `released` segments and emptied the window.
    Drained { released: usize },
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SenderState {
    phase: SessionPhase,
    window: SlidingWindowQueue,
    timer: RetransmissionTimer,
    /// Sequence number the next framed segment receives.
    next_seq: u32,
    /// First fatal cause; handed out once.
    failure: Option<TransferError>,
    cancelled: bool,
    consecutive_timeouts: u32,
    stats: TransferStats,
    /// Tells the timer driver to exit.
    shut_down: bool,
}

impl SenderState {
    /// Fail fast if the session was aborted.
    fn check_alive(&mut self) -> Result<()> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        if self.cancelled {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Shared<T, C> {
    transport: Arc<T>,
    codec: Arc<C>,
    max_timeouts: Option<u32>,
    state: Mutex<SenderState>,
    space: Condvar,
    drained: Condvar,
    timer_signal: Condvar,
}

impl<T: DatagramTransport, C: SegmentCodec> Shared<T, C> {
    fn lock(&self) -> MutexGuard<'_, SenderState> {
        lock_unpoisoned(&self.state)
    }

    /// Wake every thread blocked on the shared state.
    fn wake_all(&self) {
        self.space.notify_all();
        self.drained.notify_all();
        self.timer_signal.notify_all();
    }

    /// Record `error` as the session's cause (first one wins) and abort.
    fn fail(&self, state: &mut SenderState, error: TransferError) {
        if state.cancelled {
            log::debug!("[gbn] ignoring secondary failure: {error}");
            return;
        }
        log::error!("[gbn] session failed: {error}");
        state.failure = Some(error);
        state.cancelled = true;
        state.timer.cancel();
        self.wake_all();
    }

    fn apply_ack(&self, state: &mut SenderState, ack: AckSegment) -> AckOutcome {
        let next = ack.next_expected;
        let live = match (state.window.lower_bound(), state.window.upper_bound()) {
            (Some(lower), Some(upper)) => {
                lower < next && u64::from(next) <= u64::from(upper) + 1
            }
            _ => false,
        };
        if state.cancelled || !live {
            state.stats.acks_ignored += 1;
            log::trace!(
                "[gbn] ← ACK next={next} ignored (window {:?}..={:?})",
                state.window.lower_bound(),
                state.window.upper_bound()
            );
            return AckOutcome::Ignored;
        }

        state.timer.cancel();
        let released = state.window.release_through(next);
        state.stats.acks_accepted += 1;
        state.consecutive_timeouts = 0;
        self.space.notify_all();

        let outcome = match state.window.lower_bound() {
            Some(oldest) => {
                state.timer.arm(oldest);
                AckOutcome::Advanced { released }
            }
            None => {
                self.drained.notify_all();
                AckOutcome::Drained { released }
            }
        };
        self.timer_signal.notify_all();
        log::debug!(
            "[gbn] ← ACK next={next} released={released} in_flight={}",
            state.window.len()
        );
        outcome
    }

    /// Go back N: resend the whole window unchanged, then re-arm.
    fn retransmit_window(&self, state: &mut SenderState) -> usize {
        let Some(oldest) = state.window.lower_bound() else {
            return 0;
        };
        if state.cancelled {
            return 0;
        }
        state.stats.timeouts += 1;
        state.consecutive_timeouts += 1;
        if let Some(limit) = self.max_timeouts {
            if state.consecutive_timeouts >= limit {
                let timeouts = state.consecutive_timeouts;
                self.fail(state, TransferError::PeerUnresponsive { timeouts });
                return 0;
            }
        }

        log::debug!(
            "[gbn] timeout, retransmitting {} segment(s) from seq={oldest}",
            state.window.len()
        );
        let mut resent = 0;
        for entry in state.window.iter() {
            match self.transport.send(&entry.datagram) {
                Ok(()) => resent += 1,
                Err(e) => log::warn!("[gbn] retransmit of seq={} failed: {e}", entry.seq()),
            }
        }
        state.stats.datagrams_retransmitted += resent as u64;
        state.timer.arm(oldest);
        self.timer_signal.notify_all();
        resent
    }

    /// Block until the window is empty or the session is aborted.
    fn wait_drained(&self) -> Result<()> {
        let mut state = self.lock();
        loop {
            state.check_alive()?;
            if state.window.is_empty() {
                return Ok(());
            }
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T: DatagramTransport, C: SegmentCodec> TimerHost for Shared<T, C> {
    type State = SenderState;

    fn state(&self) -> &Mutex<SenderState> {
        &self.state
    }

    fn signal(&self) -> &Condvar {
        &self.timer_signal
    }

    fn timer(state: &mut SenderState) -> &mut RetransmissionTimer {
        &mut state.timer
    }

    fn is_shut_down(state: &SenderState) -> bool {
        state.shut_down
    }

    fn on_expiry(&self, state: &mut SenderState, bound_to: u32) {
        debug_assert_eq!(state.window.lower_bound(), Some(bound_to));
        self.retransmit_window(state);
    }
}

impl<T: DatagramTransport, C: SegmentCodec> AckSink for Shared<T, C> {
    fn on_ack(&self, ack: AckSegment) {
        let mut state = self.lock();
        self.apply_ack(&mut state, ack);
    }

    fn on_fatal(&self, error: TransferError) {
        let mut state = self.lock();
        self.fail(&mut state, error);
    }
}

// ---------------------------------------------------------------------------
// GoBackNSender
// ---------------------------------------------------------------------------

/// Sender side of one Go-Back-N transfer session.
///
/// A sender is single-use: [`transfer`](Self::transfer) runs the whole
/// session and leaves it `CLOSED`.  The lower-level operations
/// ([`send_segment`](Self::send_segment), [`on_ack`](Self::on_ack),
/// [`on_timeout`](Self::on_timeout), [`drain`](Self::drain)) are public so
/// the protocol can be exercised step by step.
#[derive(Debug)]
pub struct GoBackNSender<T: DatagramTransport, C: SegmentCodec = WireCodec> {
    shared: Arc<Shared<T, C>>,
    config: SenderConfig,
    ack_loop: Option<AckReceiverLoop>,
    timer_driver: Option<JoinHandle<()>>,
}

impl<T: DatagramTransport> GoBackNSender<T, WireCodec> {
    /// A sender speaking the default wire format over `transport`.
    pub fn new(transport: T, config: SenderConfig) -> Result<Self> {
        Self::with_codec(transport, WireCodec, config)
    }
}

impl<T: DatagramTransport, C: SegmentCodec> GoBackNSender<T, C> {
    pub fn with_codec(transport: T, codec: C, config: SenderConfig) -> Result<Self> {
        config.validate(&codec)?;
        let state = SenderState {
            phase: SessionPhase::Idle,
            window: SlidingWindowQueue::new(config.window_size),
            timer: RetransmissionTimer::new(config.timeout),
            next_seq: 0,
            failure: None,
            cancelled: false,
            consecutive_timeouts: 0,
            stats: TransferStats::default(),
            shut_down: false,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                codec: Arc::new(codec),
                max_timeouts: config.max_timeouts,
                state: Mutex::new(state),
                space: Condvar::new(),
                drained: Condvar::new(),
                timer_signal: Condvar::new(),
            }),
            config,
            ack_loop: None,
            timer_driver: None,
        })
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Run a complete session: handshake for `object_name`, send all of
    /// `source`, wait for the final acknowledgment, signal completion.
    ///
    /// Whatever happens, the ACK listener and the timer driver are stopped
    /// and joined before this returns, and the sender ends `CLOSED`.
    pub fn transfer<R, K>(
        &mut self,
        object_name: &str,
        source: R,
        control: &mut K,
    ) -> Result<TransferStats>
    where
        R: Read,
        K: ControlChannel + ?Sized,
    {
        {
            let mut state = self.shared.lock();
            if state.phase != SessionPhase::Idle {
                return Err(TransferError::InvalidState(state.phase));
            }
            set_phase(&mut state, SessionPhase::Handshaking);
        }

        let result = self.run(object_name, source, control);
        self.teardown();

        match result {
            Ok(()) => {
                let stats = self.stats();
                log::info!("[gbn] {object_name:?} transferred: {stats}");
                Ok(stats)
            }
            Err(e) => {
                log::error!("[gbn] transfer of {object_name:?} aborted: {e}");
                Err(e)
            }
        }
    }

    fn run<R, K>(&mut self, object_name: &str, mut source: R, control: &mut K) -> Result<()>
    where
        R: Read,
        K: ControlChannel + ?Sized,
    {
        control.negotiate(object_name)?;
        log::info!("[gbn] receiver accepted {object_name:?}, window={}", self.config.window_size);

        self.start_workers()?;
        set_phase(&mut self.shared.lock(), SessionPhase::Transmitting);

        let mut chunk = vec![0u8; self.config.max_payload_size];
        loop {
            let n = read_chunk(&mut source, &mut chunk).map_err(TransferError::Source)?;
            if n == 0 {
                break;
            }
            self.send_segment(chunk[..n].to_vec())?;
        }

        set_phase(&mut self.shared.lock(), SessionPhase::Draining);
        self.drain()?;
        control.finish()?;
        log::debug!("[gbn] → end-of-transmission");
        Ok(())
    }

    fn start_workers(&mut self) -> Result<()> {
        let driver = timer::spawn_driver(Arc::clone(&self.shared)).map_err(|source| {
            TransferError::Resource {
                what: "timer thread",
                source,
            }
        })?;
        self.timer_driver = Some(driver);

        let ack_loop = AckReceiverLoop::spawn(
            Arc::clone(&self.shared.transport),
            Arc::clone(&self.shared.codec),
            Arc::clone(&self.shared),
        )
        .map_err(|source| TransferError::Resource {
            what: "ACK listener thread",
            source,
        })?;
        self.ack_loop = Some(ack_loop);
        Ok(())
    }

    /// Disarm the timer, stop both worker threads and mark the session
    /// `CLOSED`.
    fn teardown(&mut self) {
        {
            let mut state = self.shared.lock();
            state.timer.cancel();
            state.shut_down = true;
        }
        self.shared.timer_signal.notify_all();

        if let Some(ack_loop) = self.ack_loop.take() {
            ack_loop.stop();
        }
        if let Some(driver) = self.timer_driver.take() {
            if driver.join().is_err() {
                log::error!("[gbn] timer driver panicked");
            }
        }
        set_phase(&mut self.shared.lock(), SessionPhase::Closed);
    }

    /// Frame `payload` as the next segment, transmit it and place it in the
    /// window, blocking while the window is full.
    ///
    /// Returns the assigned sequence number.  A failed transmit is logged and
    /// otherwise ignored: the segment stays in the window and goes out again
    /// on the next timeout.
    pub fn send_segment(&self, payload: Vec<u8>) -> Result<u32> {
        let shared = &*self.shared;
        let mut state = shared.lock();
        loop {
            state.check_alive()?;
            if !state.window.is_full() {
                break;
            }
            state = shared
                .space
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let seq = state.next_seq;
        let next_seq = seq
            .checked_add(1)
            .ok_or(TransferError::SequenceSpaceExhausted)?;
        let segment = Segment::new(seq, payload);
        let datagram = shared.codec.encode_segment(&segment)?;
        let len = segment.payload().len();

        match shared.transport.send(&datagram) {
            Ok(()) => log::debug!("[gbn] → DATA seq={seq} len={len}"),
            Err(e) => log::warn!("[gbn] transmit of seq={seq} failed, left for retransmission: {e}"),
        }

        let was_empty = state.window.is_empty();
        if state.window.push(InFlight { segment, datagram }).is_err() {
            unreachable!("window space was checked under the same lock");
        }
        state.next_seq = next_seq;
        state.stats.segments_sent += 1;
        state.stats.bytes_sent += len as u64;
        if was_empty {
            state.timer.arm(seq);
            shared.timer_signal.notify_all();
        }
        Ok(seq)
    }

    /// Apply a cumulative acknowledgment.
    ///
    /// Live only if it covers at least the oldest in-flight segment and no
    /// unsent one; anything else is ignored without touching window or timer.
    pub fn on_ack(&self, ack: AckSegment) -> AckOutcome {
        let mut state = self.shared.lock();
        self.shared.apply_ack(&mut state, ack)
    }

    /// Handle a retransmission timeout: resend every in-flight segment, then
    /// re-arm for a full interval.  Returns how many datagrams went out.
    pub fn on_timeout(&self) -> usize {
        let mut state = self.shared.lock();
        self.shared.retransmit_window(&mut state)
    }

    /// Block until every transmitted segment is acknowledged.
    pub fn drain(&self) -> Result<()> {
        self.shared.wait_drained()
    }

    /// Abort the session; blocked operations return
    /// [`TransferError::Cancelled`].
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        state.cancelled = true;
        state.timer.cancel();
        self.shared.wake_all();
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    /// Oldest unacknowledged sequence number, or the next one to be assigned
    /// when nothing is in flight.
    pub fn lower_bound(&self) -> u32 {
        let state = self.shared.lock();
        state.window.lower_bound().unwrap_or(state.next_seq)
    }

    /// Most recently transmitted sequence number still in flight.
    pub fn upper_bound(&self) -> Option<u32> {
        self.shared.lock().window.upper_bound()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.lock().window.len()
    }

    /// Copy of the window, oldest first.
    pub fn window_snapshot(&self) -> Vec<InFlight> {
        self.shared.lock().window.snapshot()
    }

    /// Segment the pending retransmission alarm is bound to, if armed.
    pub fn timer_bound_to(&self) -> Option<u32> {
        self.shared.lock().timer.bound_to()
    }

    pub fn stats(&self) -> TransferStats {
        self.shared.lock().stats
    }
}

impl<T: DatagramTransport, C: SegmentCodec> Drop for GoBackNSender<T, C> {
    fn drop(&mut self) {
        if self.ack_loop.is_some() || self.timer_driver.is_some() {
            self.teardown();
        }
    }
}

fn set_phase(state: &mut SenderState, next: SessionPhase) {
    if state.phase == next {
        return;
    }
    debug_assert!(
        state.phase.can_transition_to(next),
        "illegal transition {} → {next}",
        state.phase
    );
    log::debug!("[gbn] {} → {next}", state.phase);
    state.phase = next;
}

/// Fill `buf` from `source`, coalescing short reads.  Returns the number of
/// bytes read; less than `buf.len()` only at end of stream.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Records every datagram sent; never delivers anything back.
    #[derive(Debug, Default)]
    struct Recording {
        sent: Mutex<Vec<Vec<u8>>>,
        broken: AtomicBool,
    }

    impl Recording {
        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl DatagramTransport for Recording {
        fn send(&self, datagram: &[u8]) -> io::Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(io::ErrorKind::HostUnreachable.into());
            }
            self.sent.lock().unwrap().push(datagram.to_vec());
            Ok(())
        }

        fn recv(&self, _buf: &mut [u8]) -> io::Result<Option<usize>> {
            thread::sleep(Duration::from_millis(5));
            Ok(None)
        }
    }

    /// Acknowledges every segment immediately and in order.
    #[derive(Debug, Default)]
    struct Loopback {
        acks: Mutex<VecDeque<Vec<u8>>>,
    }

    impl DatagramTransport for Loopback {
        fn send(&self, datagram: &[u8]) -> io::Result<()> {
            let seg = WireCodec.decode_segment(datagram).unwrap();
            let ack = WireCodec.encode_ack(AckSegment::new(seg.seq() + 1));
            self.acks.lock().unwrap().push_back(ack);
            Ok(())
        }

        fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            let next = self.acks.lock().unwrap().pop_front();
            match next {
                Some(ack) => {
                    buf[..ack.len()].copy_from_slice(&ack);
                    Ok(Some(ack.len()))
                }
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Ok(None)
                }
            }
        }
    }

    /// In-memory control channel.
    struct Control {
        status: i8,
        announced: Option<String>,
        finished: bool,
    }

    impl Control {
        fn replying(status: i8) -> Self {
            Self {
                status,
                announced: None,
                finished: false,
            }
        }
    }

    impl ControlChannel for Control {
        fn negotiate(&mut self, object_name: &str) -> Result<()> {
            self.announced = Some(object_name.to_owned());
            match self.status {
                0 => Ok(()),
                code => Err(TransferError::HandshakeRejected { code }),
            }
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn config(window: usize) -> SenderConfig {
        SenderConfig::default()
            .with_window_size(window)
            .with_timeout(Duration::from_millis(500))
            .with_ack_poll_interval(Duration::from_millis(20))
    }

    fn recording(window: usize) -> GoBackNSender<Recording> {
        GoBackNSender::new(Recording::default(), config(window)).unwrap()
    }

    fn window_seqs<T: DatagramTransport>(s: &GoBackNSender<T>) -> Vec<u32> {
        s.window_snapshot().iter().map(InFlight::seq).collect()
    }

    fn send_n<T: DatagramTransport>(s: &GoBackNSender<T>, n: u32) {
        for i in 0..n {
            assert_eq!(s.send_segment(vec![i as u8]).unwrap(), i);
        }
    }

    fn ack(next: u32) -> AckSegment {
        AckSegment::new(next)
    }

    #[test]
    fn partial_ack_slides_window_and_rebinds_timer() {
        let s = recording(10);
        send_n(&s, 10);
        assert_eq!(s.timer_bound_to(), Some(0));

        assert_eq!(s.on_ack(ack(5)), AckOutcome::Advanced { released: 5 });
        assert_eq!(window_seqs(&s), [5, 6, 7, 8, 9]);
        assert_eq!(s.lower_bound(), 5);
        assert_eq!(s.upper_bound(), Some(9));
        assert_eq!(s.timer_bound_to(), Some(5));
    }

    #[test]
    fn stale_and_premature_acks_are_ignored() {
        let s = recording(10);
        send_n(&s, 6);
        s.on_ack(ack(5));

        assert_eq!(s.on_ack(ack(0)), AckOutcome::Ignored);
        assert_eq!(s.on_ack(ack(5)), AckOutcome::Ignored);
        assert_eq!(s.on_ack(ack(7)), AckOutcome::Ignored);

        assert_eq!(window_seqs(&s), [5]);
        assert_eq!(s.timer_bound_to(), Some(5));
        let stats = s.stats();
        assert_eq!((stats.acks_accepted, stats.acks_ignored), (1, 3));
    }

    #[test]
    fn full_ack_empties_window_and_disarms() {
        let s = recording(4);
        send_n(&s, 3);
        assert_eq!(s.on_ack(ack(3)), AckOutcome::Drained { released: 3 });
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.lower_bound(), 3);
        assert_eq!(s.upper_bound(), None);
        assert_eq!(s.timer_bound_to(), None);
        s.drain().unwrap();
    }

    #[test]
    fn ack_with_nothing_in_flight_is_ignored() {
        let s = recording(4);
        assert_eq!(s.on_ack(ack(1)), AckOutcome::Ignored);
        assert_eq!(s.lower_bound(), 0);
    }

    #[test]
    fn timeout_resends_window_byte_for_byte() {
        let s = recording(4);
        for payload in [b"aa".to_vec(), b"bbb".to_vec(), b"c".to_vec()] {
            s.send_segment(payload).unwrap();
        }
        let before = window_seqs(&s);

        assert_eq!(s.on_timeout(), 3);

        let sent = s.transport().sent();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[..3], sent[3..]);
        assert_eq!(window_seqs(&s), before);
        assert_eq!(s.timer_bound_to(), Some(0));
        let stats = s.stats();
        assert_eq!((stats.timeouts, stats.datagrams_retransmitted), (1, 3));
    }

    #[test]
    fn timeout_with_empty_window_does_nothing() {
        let s = recording(2);
        assert_eq!(s.on_timeout(), 0);
        assert!(s.transport().sent().is_empty());
        assert_eq!(s.stats().timeouts, 0);
    }

    #[test]
    fn full_window_blocks_producer_until_ack() {
        let s = recording(4);
        send_n(&s, 4);

        thread::scope(|scope| {
            let producer = scope.spawn(|| s.send_segment(vec![4]));
            thread::sleep(Duration::from_millis(50));
            assert!(!producer.is_finished());
            assert_eq!(s.in_flight(), 4);

            s.on_ack(ack(2));
            assert_eq!(producer.join().unwrap().unwrap(), 4);
        });
        assert_eq!(window_seqs(&s), [2, 3, 4]);
        assert_eq!(s.stats().segments_sent, 5);
    }

    #[test]
    fn window_of_one_is_stop_and_wait() {
        let s = recording(1);
        s.send_segment(vec![0]).unwrap();

        thread::scope(|scope| {
            let producer = scope.spawn(|| s.send_segment(vec![1]));
            thread::sleep(Duration::from_millis(30));
            assert_eq!(s.transport().sent().len(), 1, "second segment left early");

            s.on_ack(ack(1));
            producer.join().unwrap().unwrap();
        });
        assert_eq!(s.transport().sent().len(), 2);
        assert_eq!(window_seqs(&s), [1]);
    }

    #[test]
    fn cancel_unblocks_producer() {
        let s = recording(1);
        s.send_segment(vec![0]).unwrap();

        thread::scope(|scope| {
            let producer = scope.spawn(|| s.send_segment(vec![1]));
            thread::sleep(Duration::from_millis(30));
            s.cancel();
            assert!(matches!(producer.join().unwrap(), Err(TransferError::Cancelled)));
        });
        assert!(matches!(s.drain(), Err(TransferError::Cancelled)));
    }

    #[test]
    fn failed_transmit_keeps_segment_in_window() {
        let s = recording(2);
        s.transport().broken.store(true, Ordering::SeqCst);
        assert_eq!(s.send_segment(b"x".to_vec()).unwrap(), 0);
        assert_eq!(window_seqs(&s), [0]);
        assert_eq!(s.timer_bound_to(), Some(0));

        s.transport().broken.store(false, Ordering::SeqCst);
        assert_eq!(s.on_timeout(), 1);
        assert_eq!(s.transport().sent().len(), 1);
    }

    #[test]
    fn consecutive_timeout_limit_fails_session_once() {
        let cfg = config(2).with_max_timeouts(2);
        let s = GoBackNSender::new(Recording::default(), cfg).unwrap();
        s.send_segment(vec![0]).unwrap();

        assert_eq!(s.on_timeout(), 1);
        assert_eq!(s.on_timeout(), 0);
        assert_eq!(s.timer_bound_to(), None);

        assert!(matches!(
            s.send_segment(vec![1]),
            Err(TransferError::PeerUnresponsive { timeouts: 2 })
        ));
        assert!(matches!(s.send_segment(vec![1]), Err(TransferError::Cancelled)));
    }

    #[test]
    fn accepted_ack_resets_timeout_streak() {
        let cfg = config(4).with_max_timeouts(2);
        let s = GoBackNSender::new(Recording::default(), cfg).unwrap();
        send_n(&s, 3);

        s.on_timeout();
        s.on_ack(ack(1));
        s.on_timeout();
        assert!(s.send_segment(vec![3]).is_ok());
    }

    #[test]
    fn sequence_space_exhaustion_is_an_error() {
        let s = recording(2);
        s.shared.lock().next_seq = u32::MAX;
        assert!(matches!(
            s.send_segment(vec![0]),
            Err(TransferError::SequenceSpaceExhausted)
        ));
        assert_eq!(s.in_flight(), 0);
    }

    #[test]
    fn oversized_payload_is_codec_error() {
        let s = recording(2);
        let err = s.send_segment(vec![0; 2000]).unwrap_err();
        assert!(matches!(err, TransferError::Codec(_)));
        assert_eq!(s.lower_bound(), 0);
    }

    #[test]
    fn chunks_are_filled_to_payload_size() {
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(3);
                self.0.read(&mut buf[..n])
            }
        }

        let mut src = Trickle(Cursor::new(vec![7; 10]));
        let mut buf = [0u8; 8];
        assert_eq!(read_chunk(&mut src, &mut buf).unwrap(), 8);
        assert_eq!(read_chunk(&mut src, &mut buf).unwrap(), 2);
        assert_eq!(read_chunk(&mut src, &mut buf).unwrap(), 0);
    }

    #[test]
    fn transfer_runs_to_closed() {
        let mut s = GoBackNSender::new(Loopback::default(), config(3)).unwrap();
        let mut control = Control::replying(0);
        let data = vec![0x5a; 2500];

        let stats = s.transfer("blob.bin", Cursor::new(data), &mut control).unwrap();

        assert_eq!(stats.segments_sent, 3);
        assert_eq!(stats.bytes_sent, 2500);
        assert_eq!(control.announced.as_deref(), Some("blob.bin"));
        assert!(control.finished);
        assert_eq!(s.phase(), SessionPhase::Closed);
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.lower_bound(), 3);
    }

    #[test]
    fn empty_source_completes_without_segments() {
        let mut s = GoBackNSender::new(Loopback::default(), config(3)).unwrap();
        let mut control = Control::replying(0);
        let stats = s.transfer("empty", io::empty(), &mut control).unwrap();
        assert_eq!(stats, TransferStats::default());
        assert!(control.finished);
    }

    #[test]
    fn rejected_handshake_sends_nothing() {
        let mut s = recording(3);
        let mut control = Control::replying(-1);
        let err = s
            .transfer("missing", Cursor::new(vec![1, 2, 3]), &mut control)
            .unwrap_err();

        assert!(matches!(err, TransferError::HandshakeRejected { code: -1 }));
        assert!(s.transport().sent().is_empty());
        assert!(!control.finished);
        assert_eq!(s.phase(), SessionPhase::Closed);
    }

    #[test]
    fn sender_is_single_use() {
        let mut s = GoBackNSender::new(Loopback::default(), config(2)).unwrap();
        s.transfer("a", io::empty(), &mut Control::replying(0)).unwrap();
        assert!(matches!(
            s.transfer("b", io::empty(), &mut Control::replying(0)),
            Err(TransferError::InvalidState(SessionPhase::Closed))
        ));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let err = GoBackNSender::new(Recording::default(), config(0)).unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfig(_)));
    }
}
