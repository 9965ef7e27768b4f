//! Go-Back-N send window.
//!
//! [`SlidingWindowQueue`] is a bounded FIFO of in-flight segments (sent, not
//! yet acknowledged), oldest at the front.  It is the single source of truth
//! for window membership: both bounds are derived from its contents.
//!
//! ```text
//!  lower_bound              upper_bound   next_seq
//!      │                        │            │
//!  ────┼────────────────────────┼────────────┼──────────▶ seq space
//!      │ <──── in flight ─────▶ │            │
//!      └──── len() <= capacity ─┘
//! ```
//!
//! The queue is not synchronised on its own.  It lives inside the sender's
//! lock-guarded state next to the retransmission timer, so that enqueue,
//! cumulative release, snapshot and timer arm/cancel all share one critical
//! section.  Blocking until space frees up is done by the sender against the
//! same lock (see [`crate::sender`]).

use std::collections::VecDeque;

use crate::segment::Segment;

/// A segment occupying one slot in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    /// The segment as framed from the source.
    pub segment: Segment,
    /// The encoded datagram; retransmissions send these exact bytes.
    pub datagram: Vec<u8>,
}

impl InFlight {
    pub fn seq(&self) -> u32 {
        self.segment.seq()
    }
}

/// Returned by [`SlidingWindowQueue::push`] when no slot is free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFull(pub InFlight);

/// Bounded FIFO of in-flight segments.
#[derive(Debug)]
pub struct SlidingWindowQueue {
    entries: VecDeque<InFlight>,
    capacity: usize,
}

impl SlidingWindowQueue {
    /// Create an empty window holding at most `capacity` segments.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects that
    /// before a session is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Append `entry` behind the newest segment.
    ///
    /// Never blocks: a full window hands the entry back.
    pub fn push(&mut self, entry: InFlight) -> Result<(), WindowFull> {
        if self.is_full() {
            return Err(WindowFull(entry));
        }
        debug_assert!(
            self.entries.back().is_none_or(|last| last.seq() < entry.seq()),
            "window entries must be pushed in increasing sequence order"
        );
        self.entries.push_back(entry);
        Ok(())
    }

    /// The oldest in-flight segment, if any.
    pub fn peek_oldest(&self) -> Option<&InFlight> {
        self.entries.front()
    }

    /// Discard the oldest entry.  A no-op on an empty window.
    pub fn remove_oldest(&mut self) -> Option<InFlight> {
        self.entries.pop_front()
    }

    /// Remove every entry with `seq < next`, returning how many were released.
    pub fn release_through(&mut self, next: u32) -> usize {
        let mut released = 0;
        while self.peek_oldest().is_some_and(|e| e.seq() < next) {
            self.remove_oldest();
            released += 1;
        }
        released
    }

    /// Sequence number of the oldest unacknowledged segment.
    pub fn lower_bound(&self) -> Option<u32> {
        self.entries.front().map(InFlight::seq)
    }

    /// Sequence number of the most recently transmitted segment.
    pub fn upper_bound(&self) -> Option<u32> {
        self.entries.back().map(InFlight::seq)
    }

    /// An independent copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<InFlight> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate over in-flight entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &InFlight> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u32) -> InFlight {
        InFlight {
            segment: Segment::new(seq, vec![seq as u8]),
            datagram: seq.to_be_bytes().to_vec(),
        }
    }

    fn filled(capacity: usize, seqs: std::ops::Range<u32>) -> SlidingWindowQueue {
        let mut w = SlidingWindowQueue::new(capacity);
        for seq in seqs {
            w.push(entry(seq)).unwrap();
        }
        w
    }

    #[test]
    fn initial_state() {
        let w = SlidingWindowQueue::new(4);
        assert!(w.is_empty());
        assert!(!w.is_full());
        assert_eq!(w.len(), 0);
        assert_eq!(w.lower_bound(), None);
        assert_eq!(w.upper_bound(), None);
        assert!(w.peek_oldest().is_none());
    }

    #[test]
    fn push_refuses_when_full() {
        let mut w = filled(2, 0..2);
        assert!(w.is_full());
        let WindowFull(back) = w.push(entry(2)).unwrap_err();
        assert_eq!(back.seq(), 2);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn bounds_follow_contents() {
        let mut w = filled(4, 3..7);
        assert_eq!(w.lower_bound(), Some(3));
        assert_eq!(w.upper_bound(), Some(6));

        w.remove_oldest();
        assert_eq!(w.lower_bound(), Some(4));
        assert_eq!(w.upper_bound(), Some(6));
    }

    #[test]
    fn remove_oldest_on_empty_is_noop() {
        let mut w = SlidingWindowQueue::new(1);
        assert!(w.remove_oldest().is_none());
        assert!(w.is_empty());
    }

    #[test]
    fn release_through_is_cumulative() {
        let mut w = filled(8, 0..6);
        assert_eq!(w.release_through(4), 4);
        assert_eq!(w.lower_bound(), Some(4));
        assert_eq!(w.len(), 2);

        // Already released: nothing more to do.
        assert_eq!(w.release_through(4), 0);
        assert_eq!(w.release_through(2), 0);
        assert_eq!(w.len(), 2);

        assert_eq!(w.release_through(100), 2);
        assert!(w.is_empty());
    }

    #[test]
    fn snapshot_is_independent_and_ordered() {
        let mut w = filled(4, 0..3);
        let snap = w.snapshot();
        w.remove_oldest();

        let seqs: Vec<u32> = snap.iter().map(InFlight::seq).collect();
        assert_eq!(seqs, [0, 1, 2]);
        assert_eq!(w.len(), 2);
    }

    #[test]
    #[should_panic(expected = "window capacity")]
    fn zero_capacity_panics() {
        SlidingWindowQueue::new(0);
    }
}
