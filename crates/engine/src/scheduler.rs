// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer bookkeeping shared by every background loop (health, idle,
//! credit commit, rollover, pool refill/evict, connection heartbeat).
//! Timers are identified by `TimerId`, whose prefix tells the caller what
//! kind of timer fired without a separate lookup table.

use devbox_core::TimerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Timer entry
#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
}

/// Pending-timer bookkeeping. Pure in-memory state; owning a clock (real
/// or fake) and driving `fired_timers` on a cadence is the caller's job.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerId, Timer>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or overwrite a timer. Overwriting resets its deadline entirely;
    /// there is no accumulation across calls.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration, now: Instant) {
        self.timers.insert(id, Timer { fires_at: now + duration });
    }

    /// Cancel a timer
    pub fn cancel_timer(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Cancel all timers matching a prefix
    pub fn cancel_timers_with_prefix(&mut self, prefix: &str) {
        self.timers.retain(|id, _| !id.as_str().starts_with(prefix));
    }

    /// Remove and return every timer whose deadline has passed.
    pub fn fired_timers(&mut self, now: Instant) -> Vec<TimerId> {
        let fired: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &fired {
            self.timers.remove(id);
        }
        fired
    }

    /// Get the next timer fire time
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    /// Check if there are any pending timers
    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_timer_lifecycle() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        let id = TimerId::new("test");

        scheduler.set_timer(id.clone(), Duration::from_secs(10), now);
        assert!(scheduler.has_timers());
        assert!(scheduler.next_deadline().is_some());

        let fired = scheduler.fired_timers(now + Duration::from_secs(5));
        assert!(fired.is_empty());
        assert!(scheduler.has_timers());

        let fired = scheduler.fired_timers(now + Duration::from_secs(15));
        assert_eq!(fired, vec![id]);
        assert!(!scheduler.has_timers());
    }

    #[test]
    fn cancel_timer_prevents_firing() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        let id = TimerId::new("test");

        scheduler.set_timer(id.clone(), Duration::from_secs(10), now);
        scheduler.cancel_timer(&id);

        let fired = scheduler.fired_timers(now + Duration::from_secs(15));
        assert!(fired.is_empty());
    }

    #[test]
    fn cancel_with_prefix_clears_only_matching_timers() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.set_timer(TimerId::new("idle-check:sess-1"), Duration::from_secs(5), now);
        scheduler.set_timer(TimerId::new("credit-commit:sess-1"), Duration::from_secs(5), now);
        scheduler.set_timer(TimerId::new("health-probe:sbx-1"), Duration::from_secs(5), now);

        scheduler.cancel_timers_with_prefix("idle-check:");

        let fired = scheduler.fired_timers(now + Duration::from_secs(10));
        assert_eq!(fired.len(), 2);
        assert!(!fired.iter().any(|id| id.is_idle_check()));
    }

    #[test]
    fn multiple_timers_fire_independently() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.set_timer(TimerId::new("fast"), Duration::from_secs(5), now);
        scheduler.set_timer(TimerId::new("slow"), Duration::from_secs(20), now);

        let fired = scheduler.fired_timers(now + Duration::from_secs(6));
        assert_eq!(fired, vec![TimerId::new("fast")]);
        assert!(scheduler.has_timers());

        let fired = scheduler.fired_timers(now + Duration::from_secs(21));
        assert_eq!(fired, vec![TimerId::new("slow")]);
        assert!(!scheduler.has_timers());
    }

    #[test]
    fn next_deadline_returns_earliest() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.set_timer(TimerId::new("later"), Duration::from_secs(30), now);
        scheduler.set_timer(TimerId::new("sooner"), Duration::from_secs(10), now);

        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn overwrite_timer_resets_deadline() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        let id = TimerId::new("t");
        scheduler.set_timer(id.clone(), Duration::from_secs(10), now);

        let later = now + Duration::from_secs(2);
        scheduler.set_timer(id.clone(), Duration::from_secs(20), later);

        let fired = scheduler.fired_timers(now + Duration::from_secs(11));
        assert!(fired.is_empty(), "old deadline should be overwritten");

        let fired = scheduler.fired_timers(later + Duration::from_secs(20));
        assert_eq!(fired, vec![id]);
    }

    #[test]
    fn empty_scheduler_has_no_deadline() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.has_timers());
        assert!(scheduler.next_deadline().is_none());
    }
}
