//! Packet counters and the end-of-scan summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic packet counters, one writer per counter, relaxed ordering.
///
/// `probes` counts only chains flagged as probes so progress reflects
/// logical probes rather than follow-up traffic on the wire.
#[derive(Debug, Default)]
pub struct Counters {
    pub sent: AtomicU64,
    pub probes: AtomicU64,
    pub received: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters, cheap to pass around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent: u64,
    pub probes: u64,
    pub received: u64,
}

/// What a finished scan reports back to the caller.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub sent: u64,
    pub probes: u64,
    pub received: u64,
    pub elapsed: Duration,
}

impl ScanSummary {
    /// Average outbound packet rate over the whole run.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.sent as f64 / secs
        }
    }
}
