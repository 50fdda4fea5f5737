//! Network simulation on top of an in-process transport.
//!
//! [Simulated] delays every send by a fixed latency plus the time the payload needs at the given
//! bandwidth, and counts messages and bytes per sender.

use super::{check_ids, Transport};
use crate::PartyId;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Simulated link characteristics. Zero disables the corresponding delay.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetworkOverhead {
    /// Delay added to every message, in milliseconds.
    pub latency_ms: f64,
    /// Link bandwidth in bytes per second.
    pub bytes_per_sec: f64,
}

impl NetworkOverhead {
    /// Whether no delay is applied at all.
    pub fn is_none(&self) -> bool {
        self.latency_ms <= 0.0 && self.bytes_per_sec <= 0.0
    }

    /// Delay applied to a message of `len` bytes.
    pub fn delay(&self, len: usize) -> Duration {
        let mut secs = 0.0;
        if self.latency_ms > 0.0 {
            secs += self.latency_ms / 1000.0;
        }
        if self.bytes_per_sec > 0.0 {
            secs += len as f64 / self.bytes_per_sec;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Traffic sent by one party.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Traffic {
    /// Number of messages.
    pub messages: usize,
    /// Total payload size in bytes.
    pub bytes: usize,
}

#[derive(Debug, Default)]
struct Counter {
    messages: AtomicUsize,
    bytes: AtomicUsize,
}

/// Transport wrapper adding [NetworkOverhead] and per-sender [Traffic] counters.
#[derive(Debug)]
pub struct Simulated<T> {
    inner: T,
    overhead: NetworkOverhead,
    sent: Vec<Counter>,
}

impl<T: Transport> Simulated<T> {
    /// Wrap `inner`.
    pub fn new(inner: T, overhead: NetworkOverhead) -> Self {
        let sent = (0..inner.party_count())
            .map(|_| Counter::default())
            .collect();
        Self {
            inner,
            overhead,
            sent,
        }
    }

    /// Traffic sent so far by `id`.
    pub fn traffic(&self, id: PartyId) -> Option<Traffic> {
        self.sent.get(id).map(|c| Traffic {
            messages: c.messages.load(Ordering::Relaxed),
            bytes: c.bytes.load(Ordering::Relaxed),
        })
    }

    /// Traffic sent so far by every party, indexed by id.
    pub fn traffic_all(&self) -> Vec<Traffic> {
        (0..self.sent.len())
            .filter_map(|id| self.traffic(id))
            .collect()
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for Simulated<T> {
    fn party_count(&self) -> usize {
        self.inner.party_count()
    }

    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        check_ids(from, to, self.sent.len())?;

        if !self.overhead.is_none() {
            std::thread::sleep(self.overhead.delay(bytes.len()));
        }

        let counter = &self.sent[from];
        counter.messages.fetch_add(1, Ordering::Relaxed);
        counter.bytes.fetch_add(bytes.len(), Ordering::Relaxed);

        self.inner.send(from, to, bytes)
    }

    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>> {
        self.inner.receive(from, to)
    }
}
