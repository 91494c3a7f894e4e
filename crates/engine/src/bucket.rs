//! Time-driven token bucket.
//!
//! The bucket starts empty and accrues `rate` tokens per second of
//! wall-clock time, capped at one second's burst. Rate 0 disables
//! throttling: every operation becomes a cheap no-op that always
//! succeeds. The loop worker and the send worker each pace against
//! their own bucket, so the wire rate tracks the configured rate
//! instead of splitting it between the two sides.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use pktizr_common::Shutdown;

/// Longest single sleep while waiting for a token, so a stop request
/// is observed promptly.
const WAIT_QUANTUM: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct TokenBucket {
    rate: u64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_tick: Instant,
}

impl TokenBucket {
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            state: Mutex::new(BucketState {
                tokens: 0.0,
                last_tick: Instant::now(),
            }),
        }
    }

    #[inline]
    pub fn unlimited(&self) -> bool {
        self.rate == 0
    }

    /// Advance the bucket by the elapsed wall-clock time.
    pub fn refill(&self) {
        if self.rate == 0 {
            return;
        }
        let mut st = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(st.last_tick).as_secs_f64();
        st.tokens = (st.tokens + elapsed * self.rate as f64).min(self.rate as f64);
        st.last_tick = now;
    }

    /// Whether a full token is available right now.
    pub fn has_token(&self) -> bool {
        self.rate == 0 || self.state.lock().tokens >= 1.0
    }

    /// Charge one token; callers check `has_token` (or `wait_ready`)
    /// first.
    pub fn debit(&self) {
        if self.rate == 0 {
            return;
        }
        self.state.lock().tokens -= 1.0;
    }

    /// Block in short, stop-aware sleeps until a token is available.
    /// Returns false when the wait was abandoned because of a stop
    /// request.
    pub fn wait_ready(&self, shutdown: &Shutdown) -> bool {
        if self.rate == 0 {
            return true;
        }
        loop {
            if shutdown.stop_requested() {
                return false;
            }
            self.refill();
            let deficit = {
                let st = self.state.lock();
                1.0 - st.tokens
            };
            if deficit <= 0.0 {
                return true;
            }
            let needed = Duration::from_secs_f64(deficit / self.rate as f64);
            std::thread::sleep(needed.min(WAIT_QUANTUM));
        }
    }
}
