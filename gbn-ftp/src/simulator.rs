//! In-process lossy datagram link for deterministic testing.
//!
//! [`lossy_link`] returns two connected [`LinkEndpoint`]s, each a
//! [`DatagramTransport`].  Every datagram sent through an endpoint passes a
//! fault model drawn from a seeded RNG, so a failing run replays exactly:
//!
//! | Fault       | Description                                               |
//! |-------------|-----------------------------------------------------------|
//! | Loss        | Drop the datagram with probability `loss_rate`.           |
//! | Duplication | Deliver it twice with probability `duplicate_rate`.       |
//! | Reordering  | With probability `reorder_rate`, hold it back and release |
//! |             | it right after the next datagram in the same direction.   |
//!
//! Each direction has its own [`LinkConfig`].  [`LinkEndpoint::sever`] breaks
//! the link for good; both sides then fail every call.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::lock_unpoisoned;
use crate::transport::DatagramTransport;

/// Fault model for one direction of the link.
///
/// Probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub reorder_rate: f64,
    pub seed: u64,
    /// Bounded wait of one `recv` on the receiving endpoint.
    pub poll_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        // Transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl LinkConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn with_loss(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn with_duplication(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate;
        self
    }

    pub fn with_reordering(mut self, rate: f64) -> Self {
        self.reorder_rate = rate;
        self
    }
}

/// Per-direction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub offered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

/// Datagrams in flight towards one endpoint.
#[derive(Debug, Default)]
struct Pipe {
    queue: Mutex<VecDeque<Vec<u8>>>,
    ready: Condvar,
}

impl Pipe {
    fn deliver(&self, datagram: Vec<u8>) {
        lock_unpoisoned(&self.queue).push_back(datagram);
        self.ready.notify_one();
    }
}

#[derive(Debug)]
struct Faults {
    config: LinkConfig,
    rng: StdRng,
    held: Option<Vec<u8>>,
    stats: LinkStats,
}

impl Faults {
    fn new(mut config: LinkConfig) -> Self {
        config.loss_rate = config.loss_rate.clamp(0.0, 1.0);
        config.duplicate_rate = config.duplicate_rate.clamp(0.0, 1.0);
        config.reorder_rate = config.reorder_rate.clamp(0.0, 1.0);
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            held: None,
            stats: LinkStats::default(),
        }
    }
}

/// One side of a [`lossy_link`].
#[derive(Debug)]
pub struct LinkEndpoint {
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
    /// Faults applied to what this endpoint sends.
    faults: Mutex<Faults>,
    /// Bounded wait for this endpoint's `recv`.
    poll_interval: Duration,
    severed: Arc<AtomicBool>,
}

/// Build a connected pair.  `a_to_b` shapes traffic sent by the first
/// endpoint, `b_to_a` traffic sent by the second.
pub fn lossy_link(a_to_b: LinkConfig, b_to_a: LinkConfig) -> (LinkEndpoint, LinkEndpoint) {
    let to_a = Arc::new(Pipe::default());
    let to_b = Arc::new(Pipe::default());
    let severed = Arc::new(AtomicBool::new(false));
    let a = LinkEndpoint {
        inbound: Arc::clone(&to_a),
        outbound: Arc::clone(&to_b),
        poll_interval: b_to_a.poll_interval,
        faults: Mutex::new(Faults::new(a_to_b.clone())),
        severed: Arc::clone(&severed),
    };
    let b = LinkEndpoint {
        inbound: to_b,
        outbound: to_a,
        poll_interval: a_to_b.poll_interval,
        faults: Mutex::new(Faults::new(b_to_a)),
        severed,
    };
    (a, b)
}

impl LinkEndpoint {
    /// Counters for datagrams sent from this endpoint.
    pub fn stats(&self) -> LinkStats {
        lock_unpoisoned(&self.faults).stats
    }

    /// Break the link in both directions.
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
        self.inbound.ready.notify_all();
        self.outbound.ready.notify_all();
    }

    fn check_severed(&self) -> io::Result<()> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "link severed"));
        }
        Ok(())
    }
}

impl DatagramTransport for LinkEndpoint {
    fn send(&self, datagram: &[u8]) -> io::Result<()> {
        self.check_severed()?;
        let mut faults = lock_unpoisoned(&self.faults);
        let Faults {
            config,
            rng,
            held,
            stats,
        } = &mut *faults;
        stats.offered += 1;

        if rng.random_bool(config.loss_rate) {
            stats.dropped += 1;
            return Ok(());
        }
        if held.is_none() && rng.random_bool(config.reorder_rate) {
            stats.reordered += 1;
            *held = Some(datagram.to_vec());
            return Ok(());
        }

        self.outbound.deliver(datagram.to_vec());
        if rng.random_bool(config.duplicate_rate) {
            stats.duplicated += 1;
            self.outbound.deliver(datagram.to_vec());
        }
        if let Some(late) = held.take() {
            self.outbound.deliver(late);
        }
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        self.check_severed()?;
        let queue = lock_unpoisoned(&self.inbound.queue);
        let (mut queue, _) = self
            .inbound
            .ready
            .wait_timeout_while(queue, self.poll_interval, |q| {
                q.is_empty() && !self.severed.load(Ordering::SeqCst)
            })
            .unwrap_or_else(PoisonError::into_inner);
        self.check_severed()?;

        match queue.pop_front() {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ep: &LinkEndpoint) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Some(n) = ep.recv(&mut buf).unwrap() {
            out.push(buf[..n].to_vec());
        }
        out
    }

    #[test]
    fn clean_link_delivers_in_order() {
        let (a, b) = lossy_link(LinkConfig::default(), LinkConfig::default());
        a.send(b"one").unwrap();
        a.send(b"two").unwrap();
        b.send(b"back").unwrap();

        assert_eq!(drain(&b), [b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(drain(&a), [b"back".to_vec()]);
    }

    #[test]
    fn total_loss_drops_everything() {
        let (a, b) = lossy_link(LinkConfig::seeded(1).with_loss(1.0), LinkConfig::default());
        for _ in 0..5 {
            a.send(b"x").unwrap();
        }
        assert!(drain(&b).is_empty());
        assert_eq!(a.stats().dropped, 5);
    }

    #[test]
    fn certain_duplication_doubles() {
        let (a, b) = lossy_link(
            LinkConfig::seeded(2).with_duplication(1.0),
            LinkConfig::default(),
        );
        a.send(b"d").unwrap();
        assert_eq!(drain(&b).len(), 2);
    }

    #[test]
    fn reordered_datagram_follows_the_next_one() {
        let (a, b) = lossy_link(LinkConfig::seeded(3).with_reordering(1.0), LinkConfig::default());
        a.send(b"first").unwrap();
        a.send(b"second").unwrap();
        assert_eq!(drain(&b), [b"second".to_vec(), b"first".to_vec()]);
        assert_eq!(a.stats().reordered, 1);
    }

    #[test]
    fn same_seed_same_faults() {
        let run = || {
            let (a, b) = lossy_link(LinkConfig::seeded(42).with_loss(0.5), LinkConfig::default());
            for i in 0..32u8 {
                a.send(&[i]).unwrap();
            }
            drain(&b)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn severed_link_fails_both_sides() {
        let (a, b) = lossy_link(LinkConfig::default(), LinkConfig::default());
        b.sever();
        assert_eq!(a.send(b"x").unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
        let mut buf = [0u8; 4];
        assert!(a.recv(&mut buf).is_err());
    }
}
