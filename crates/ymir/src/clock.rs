//! Time and randomness sources.
//!
//! Backoff and cooldown bookkeeping never reads the wall clock or the RNG
//! directly, so tests can drive them deterministically.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Millisecond clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Source of backoff jitter.
pub trait JitterSource: Send + Sync {
    /// A value in `[0, upper_exclusive)`, or 0 when the range is empty.
    fn jitter_ms(&self, upper_exclusive: u64) -> u64;
}

/// Uniform jitter from the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter_ms(&self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..upper_exclusive)
    }
}

/// Constant jitter, clamped into range.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedJitter(pub u64);

impl JitterSource for FixedJitter {
    fn jitter_ms(&self, upper_exclusive: u64) -> u64 {
        self.0.min(upper_exclusive.saturating_sub(1))
    }
}
