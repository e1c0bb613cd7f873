// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics Sampler (§4.4): samples `Driver.sample_stats` for every active
//! session at a fixed cadence, derives `cpu_percent` from the delta
//! between two consecutive raw samples, and pushes the resulting
//! `ResourceSnapshot` onto a bounded per-session ring while also
//! forwarding it to the usage meter as a cold stream. Cancellation is
//! explicit: the sampler stops within one `sample_interval` of `reap`,
//! and self-terminates if the driver reports the sandbox gone.

use devbox_core::{Clock, ResourceSnapshot, SessionId};
use devbox_driver::{DriverError, RawStats, SandboxDriver, SandboxHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The previous raw sample for a session, used to derive deltas. The
/// first sample for a session yields no `ResourceSnapshot` at all (§4.4:
/// "the first sample yields no derived value").
#[derive(Debug, Clone, Copy)]
struct PrevSample {
    ts_ms: u64,
    raw: RawStats,
}

/// A bounded ring of snapshots for one session, retaining only the last
/// `window` of wall-clock time. Full rings drop the oldest entry rather
/// than reject the newest (§5 backpressure policy).
#[derive(Debug, Default)]
pub struct SnapshotRing {
    window: Duration,
    entries: VecDeque<ResourceSnapshot>,
}

impl SnapshotRing {
    pub fn new(window: Duration) -> Self {
        Self { window, entries: VecDeque::new() }
    }

    pub fn push(&mut self, snapshot: ResourceSnapshot) {
        self.entries.push_back(snapshot);
        let cutoff = snapshot.ts_ms.saturating_sub(self.window.as_millis() as u64);
        while let Some(front) = self.entries.front() {
            if front.ts_ms < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &ResourceSnapshot> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&ResourceSnapshot> {
        self.entries.back()
    }
}

/// cpu_percent = (Δ container_cpu) / (Δ system_cpu) × 100, guarding
/// against a zero or negative system-cpu delta (clock skew, a counter
/// reset on engine restart) by reporting 0 rather than dividing by zero
/// or going negative.
fn derive_cpu_percent(prev: &RawStats, curr: &RawStats) -> f64 {
    let cpu_delta = curr.cpu_usage_ns.saturating_sub(prev.cpu_usage_ns) as f64;
    let sys_delta = curr.system_cpu_ns.saturating_sub(prev.system_cpu_ns) as f64;
    if sys_delta <= 0.0 {
        return 0.0;
    }
    (cpu_delta / sys_delta * 100.0).clamp(0.0, 100.0 * num_cpus_upper_bound())
}

/// Engines report system_cpu_ns as a single core's worth of busy time in
/// some drivers and the whole machine's in others; clamping at a
/// generous upper bound catches a misconfigured driver without silently
/// discarding a legitimately multi-core-busy sample.
fn num_cpus_upper_bound() -> f64 {
    256.0
}

fn derive_snapshot(prev: &PrevSample, ts_ms: u64, raw: &RawStats) -> ResourceSnapshot {
    ResourceSnapshot {
        ts_ms,
        cpu_percent: derive_cpu_percent(&prev.raw, raw),
        mem_bytes: raw.mem_bytes,
        disk_read_bytes: raw.disk_read_bytes.saturating_sub(prev.raw.disk_read_bytes),
        disk_write_bytes: raw.disk_write_bytes.saturating_sub(prev.raw.disk_write_bytes),
        net_rx_bytes: raw.net_rx_bytes.saturating_sub(prev.raw.net_rx_bytes),
        net_tx_bytes: raw.net_tx_bytes.saturating_sub(prev.raw.net_tx_bytes),
        gpu_percent: raw.gpu_percent,
        gpu_mem_bytes: raw.gpu_mem_bytes,
        is_idle: false,
    }
}

/// One session's sampling state: the previous raw sample (for deltas)
/// and its snapshot ring.
struct SessionState {
    prev: Option<PrevSample>,
    ring: SnapshotRing,
}

/// Samples every registered session's sandbox at a fixed cadence and
/// fans snapshots out to subscribers (the usage meter). `D` is the
/// driver, `C` the clock — both swappable for deterministic tests.
pub struct MetricsSampler<D: SandboxDriver, C: Clock> {
    driver: D,
    clock: C,
    sample_interval: Duration,
    ring_window: Duration,
    sessions: Mutex<HashMap<SessionId, (SandboxHandle, SessionState)>>,
    subscribers: Mutex<Vec<mpsc::Sender<(SessionId, ResourceSnapshot)>>>,
}

impl<D: SandboxDriver, C: Clock> MetricsSampler<D, C> {
    pub fn new(driver: D, clock: C, sample_interval: Duration, ring_window: Duration) -> Self {
        Self {
            driver,
            clock,
            sample_interval,
            ring_window,
            sessions: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Begin sampling a session's sandbox. Idempotent: re-registering
    /// resets the delta state, which only matters for the next
    /// derivation (first post-register sample yields no snapshot).
    pub fn register(&self, session: SessionId, handle: SandboxHandle) {
        self.sessions.lock().insert(
            session,
            (handle, SessionState { prev: None, ring: SnapshotRing::new(self.ring_window) }),
        );
    }

    /// Stop sampling a session; its ring is dropped with it.
    pub fn unregister(&self, session: &SessionId) {
        self.sessions.lock().remove(session);
    }

    /// Subscribe to every derived snapshot, tagged with its session.
    /// Used by the usage meter to consume the cold stream (§4.4).
    pub fn subscribe(&self) -> mpsc::Receiver<(SessionId, ResourceSnapshot)> {
        let (tx, rx) = mpsc::channel(1024);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn ring_len(&self, session: &SessionId) -> usize {
        self.sessions.lock().get(session).map(|(_, s)| s.ring.len()).unwrap_or(0)
    }

    pub fn latest(&self, session: &SessionId) -> Option<ResourceSnapshot> {
        self.sessions.lock().get(session).and_then(|(_, s)| s.ring.latest().copied())
    }

    /// One sampling tick for a single registered session. Returns
    /// `Ok(None)` for the first sample after registration (no delta yet)
    /// or if the engine reports the sandbox gone (caller should
    /// `unregister` and stop).
    pub async fn sample_once(&self, session: &SessionId) -> Result<Option<ResourceSnapshot>, DriverError> {
        let handle = {
            let sessions = self.sessions.lock();
            match sessions.get(session) {
                Some((handle, _)) => handle.clone(),
                None => return Ok(None),
            }
        };

        let raw = match self.driver.sample_stats(&handle).await {
            Ok(raw) => raw,
            Err(DriverError::NotFound(_)) => {
                self.unregister(session);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let ts_ms = self.clock.epoch_ms();
        let snapshot = {
            let mut sessions = self.sessions.lock();
            let Some((_, state)) = sessions.get_mut(session) else {
                return Ok(None);
            };
            let snapshot = state.prev.map(|prev| derive_snapshot(&prev, ts_ms, &raw));
            state.prev = Some(PrevSample { ts_ms, raw });
            if let Some(snapshot) = snapshot {
                state.ring.push(snapshot);
            }
            snapshot
        };

        if let Some(snapshot) = snapshot {
            let subscribers = self.subscribers.lock().clone();
            for tx in subscribers {
                let _ = tx.try_send((session.clone(), snapshot));
            }
        }

        Ok(snapshot)
    }

    /// Background sampling loop (§4.4, §5): cancellable, and stops
    /// sampling a session within one `sample_interval` of it being
    /// unregistered by a concurrent `reap`.
    pub async fn run(&self, token: CancellationToken, active_sessions: impl Fn() -> Vec<SessionId>) {
        let mut interval = tokio::time::interval(self.sample_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    for session in active_sessions() {
                        let _ = self.sample_once(&session).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_core::FakeClock;
    use devbox_driver::FakeDriver;

    fn sampler() -> MetricsSampler<FakeDriver, FakeClock> {
        MetricsSampler::new(
            FakeDriver::new(),
            FakeClock::new(0),
            Duration::from_secs(1),
            Duration::from_secs(600),
        )
    }

    fn spec() -> devbox_driver::SandboxSpec {
        devbox_driver::SandboxSpec::new(
            "python:3.11",
            vec!["sh".to_string()],
            devbox_core::ResourceLimits::new(512, 1 << 30, 128, 25 << 20),
            devbox_core::SecurityProfile::locked_down("default"),
        )
    }

    #[tokio::test]
    async fn first_sample_yields_no_snapshot() {
        let sampler = sampler();
        let session = SessionId::new("sess-1");
        let handle = sampler.driver.create(&spec()).await.unwrap();
        sampler.register(session.clone(), handle);

        let snapshot = sampler.sample_once(&session).await.unwrap();
        assert!(snapshot.is_none());
        assert_eq!(sampler.ring_len(&session), 0);
    }

    #[tokio::test]
    async fn second_sample_derives_deltas() {
        let sampler = sampler();
        let session = SessionId::new("sess-1");
        let created = sampler.driver.create(&spec()).await.unwrap();
        sampler.register(session.clone(), created.clone());

        sampler.driver.set_stats(&created, RawStats {
            cpu_usage_ns: 1_000_000_000,
            system_cpu_ns: 10_000_000_000,
            mem_bytes: 100 << 20,
            disk_read_bytes: 1_000,
            disk_write_bytes: 500,
            net_rx_bytes: 2_000,
            net_tx_bytes: 1_000,
            gpu_percent: None,
            gpu_mem_bytes: None,
        });
        sampler.sample_once(&session).await.unwrap();

        sampler.driver.set_stats(&created, RawStats {
            cpu_usage_ns: 1_500_000_000,
            system_cpu_ns: 11_000_000_000,
            mem_bytes: 110 << 20,
            disk_read_bytes: 1_500,
            disk_write_bytes: 900,
            net_rx_bytes: 3_000,
            net_tx_bytes: 1_200,
            gpu_percent: None,
            gpu_mem_bytes: None,
        });
        let snapshot = sampler.sample_once(&session).await.unwrap().unwrap();

        assert_eq!(snapshot.cpu_percent, 50.0);
        assert_eq!(snapshot.disk_read_bytes, 500);
        assert_eq!(snapshot.net_tx_bytes, 200);
        assert_eq!(sampler.ring_len(&session), 1);
    }

    #[tokio::test]
    async fn ring_drops_oldest_outside_window() {
        let mut ring = SnapshotRing::new(Duration::from_millis(100));
        ring.push(ResourceSnapshot::minimal(0, 1.0, 1));
        ring.push(ResourceSnapshot::minimal(50, 1.0, 1));
        ring.push(ResourceSnapshot::minimal(200, 1.0, 1));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.latest().unwrap().ts_ms, 200);
    }

    #[tokio::test]
    async fn gone_sandbox_self_unregisters() {
        let sampler = sampler();
        let session = SessionId::new("sess-1");
        let handle = sampler.driver.create(&spec()).await.unwrap();
        sampler.register(session.clone(), handle);
        sampler.driver.fail_not_found_next_sample_stats();

        let snapshot = sampler.sample_once(&session).await.unwrap();
        assert!(snapshot.is_none());
        assert_eq!(sampler.ring_len(&session), 0);
    }
}
