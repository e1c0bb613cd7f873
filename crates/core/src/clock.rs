// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so time-dependent logic (idle detection, rollover,
//! commit scheduling) can be driven deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for the runtime.
///
/// `Instant`-based values are used for interval math (sampling cadence,
/// health probes); `epoch_ms` is used for anything that crosses a process
/// restart (WAL timestamps, transaction `created_at`, rollover bookkeeping).
pub trait Clock: Clone + Send + Sync + 'static {
    /// A monotonic instant, suitable for measuring elapsed durations.
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;
}

/// Real wall-clock time, for production use.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Controllable clock for tests: `now()` is pinned to the instant the clock
/// was created and only moves forward when `advance` is called, so idle
/// timers, rollover, and commit-interval logic can be exercised without
/// real sleeps.
#[derive(Clone)]
pub struct FakeClock {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
    epoch_base_ms: u64,
}

impl FakeClock {
    /// Create a fake clock pinned at the given epoch milliseconds.
    pub fn new(epoch_base_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
            epoch_base_ms,
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + std::time::Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_base_ms + self.offset_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_both_now_and_epoch() {
        let clock = FakeClock::new(1_000);
        let t0 = clock.now();
        assert_eq!(clock.epoch_ms(), 1_000);

        clock.advance(500);
        assert_eq!(clock.epoch_ms(), 1_500);
        assert_eq!(clock.now().duration_since(t0).as_millis(), 500);
    }

    #[test]
    fn fake_clock_clones_share_state() {
        let clock = FakeClock::new(0);
        let clone = clock.clone();
        clock.advance(10);
        assert_eq!(clone.epoch_ms(), 10);
    }
}
