// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Usage Meter (§4.5): classifies idleness from the metrics sampler's
//! snapshot stream, converts active usage into billing-unit cost at a
//! canonical per-second rate, estimates an hourly burn rate for
//! `predict_remaining`, and commits accrued cost to the Credits Ledger
//! on a fixed cadence and at reap. Cost accumulates as an exact
//! `Decimal` sum and is rounded only when a commit actually happens
//! (§4.5: "accumulated as a rational sum and rounded only at ledger
//! commit").

use devbox_core::{EnvironmentClass, RateTable, ResourceSnapshot, SessionId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::time::Duration;

/// Bound on how many recent per-interval costs feed the hourly-rate
/// estimate (§4.5: "average cost across the last N snapshots").
const HOURLY_ESTIMATE_WINDOW: usize = 30;

/// What happened as a result of observing one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTransition {
    /// No change in idle/active status.
    None,
    /// Continuously-idle streak just crossed `idle_duration_threshold`.
    BecameIdle,
    /// A non-idle snapshot arrived after the session had been marked idle.
    BecameActive,
}

/// Result of feeding one snapshot through the meter.
#[derive(Debug, Clone, Copy)]
pub struct ObserveOutcome {
    pub is_idle_snapshot: bool,
    pub transition: IdleTransition,
    pub accrued_cost: Decimal,
}

#[derive(Debug, Clone)]
struct SessionMeter {
    environment_class: EnvironmentClass,
    idle_streak_started_ms: Option<u64>,
    marked_idle: bool,
    pending_cost: Decimal,
    recent_interval_costs: Vec<(u64, Decimal)>,
}

impl SessionMeter {
    fn new(environment_class: EnvironmentClass) -> Self {
        Self {
            environment_class,
            idle_streak_started_ms: None,
            marked_idle: false,
            pending_cost: Decimal::ZERO,
            recent_interval_costs: Vec::new(),
        }
    }
}

/// Cost in billing units for one sampled interval at a canonical
/// per-second rate (§4.5, Open Question resolved in DESIGN.md: rates are
/// per-second). The `interval / 3600` factor in §4.5's formula is kept
/// exactly as given — it converts the per-second rate application to the
/// sampled interval — so cpu/mem/gpu terms scale by `interval_secs / 3600`
/// while the disk/net terms are left un-scaled, matching the formula.
pub fn interval_cost(
    snapshot: &ResourceSnapshot,
    interval_secs: Decimal,
    environment_class: EnvironmentClass,
    rates: &RateTable,
) -> Decimal {
    let interval_hours = interval_secs / dec!(3600);
    let cpu_cores = Decimal::try_from(snapshot.cpu_percent / 100.0).unwrap_or(Decimal::ZERO);
    let mem_gib = Decimal::from(snapshot.mem_bytes) / dec!(1_073_741_824);
    let mut cost = cpu_cores * interval_hours * rates.cpu_unit_rate
        + mem_gib * interval_hours * rates.mem_unit_rate;

    if let Some(gpu_percent) = snapshot.gpu_percent {
        let gpu_fraction = Decimal::try_from(gpu_percent / 100.0).unwrap_or(Decimal::ZERO);
        cost += gpu_fraction * interval_hours * rates.gpu_unit_rate;
    }

    let mb = dec!(1_048_576);
    let disk_mb = Decimal::from(snapshot.disk_read_bytes + snapshot.disk_write_bytes) / mb;
    let net_mb = Decimal::from(snapshot.net_rx_bytes + snapshot.net_tx_bytes) / mb;
    cost += disk_mb * rates.io_unit_rate + net_mb * rates.bandwidth_unit_rate;

    (cost * environment_class.multiplier()).max(Decimal::ZERO)
}

/// Idle classification (§4.5, Open Question resolved in DESIGN.md: the
/// baseline subtraction defaults to 0 unless the environment class
/// supplies an override).
pub fn is_idle_snapshot(
    snapshot: &ResourceSnapshot,
    environment_class: EnvironmentClass,
    idle_cpu_threshold_percent: f64,
    idle_mem_threshold_bytes: u64,
    global_baseline_mem_bytes: u64,
) -> bool {
    let baseline = environment_class
        .baseline_mem_bytes()
        .unwrap_or(global_baseline_mem_bytes);
    let mem_above_baseline = snapshot.mem_bytes.saturating_sub(baseline);
    snapshot.cpu_percent < idle_cpu_threshold_percent && mem_above_baseline < idle_mem_threshold_bytes
}

/// Usage Meter. Tracks per-session idle streaks, accrued cost, and a
/// rolling hourly-rate estimate; commits are the caller's responsibility
/// (the meter only reports what's due so the ledger call can go through
/// whatever transactional boundary the daemon owns).
pub struct UsageMeter {
    idle_cpu_threshold_percent: f64,
    idle_mem_threshold_bytes: u64,
    idle_duration_threshold: Duration,
    baseline_mem_bytes: u64,
    rates: RateTable,
    sessions: Mutex<HashMap<SessionId, SessionMeter>>,
}

impl UsageMeter {
    pub fn new(
        idle_cpu_threshold_percent: f64,
        idle_mem_threshold_bytes: u64,
        idle_duration_threshold: Duration,
        baseline_mem_bytes: u64,
        rates: RateTable,
    ) -> Self {
        Self {
            idle_cpu_threshold_percent,
            idle_mem_threshold_bytes,
            idle_duration_threshold,
            baseline_mem_bytes,
            rates,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, session: SessionId, environment_class: EnvironmentClass) {
        self.sessions.lock().insert(session, SessionMeter::new(environment_class));
    }

    pub fn unregister(&self, session: &SessionId) {
        self.sessions.lock().remove(session);
    }

    /// Feed one snapshot through idle classification and cost accrual.
    /// `prev_ts_ms` is the timestamp of the previous snapshot this
    /// session saw (or its session start), used to derive the interval
    /// length for cost — the sampler's cadence is configured but a
    /// caller should never assume it's exact.
    pub fn observe(
        &self,
        session: &SessionId,
        snapshot: &ResourceSnapshot,
        prev_ts_ms: u64,
    ) -> Option<ObserveOutcome> {
        let mut sessions = self.sessions.lock();
        let meter = sessions.get_mut(session)?;

        let idle = is_idle_snapshot(
            snapshot,
            meter.environment_class,
            self.idle_cpu_threshold_percent,
            self.idle_mem_threshold_bytes,
            self.baseline_mem_bytes,
        );

        let mut transition = IdleTransition::None;
        if idle {
            let streak_start = *meter.idle_streak_started_ms.get_or_insert(snapshot.ts_ms);
            let streak_duration_ms = snapshot.ts_ms.saturating_sub(streak_start);
            if !meter.marked_idle && streak_duration_ms >= self.idle_duration_threshold.as_millis() as u64 {
                meter.marked_idle = true;
                transition = IdleTransition::BecameIdle;
            }
        } else {
            if meter.marked_idle {
                transition = IdleTransition::BecameActive;
            }
            meter.idle_streak_started_ms = None;
            meter.marked_idle = false;
        }

        let interval_ms = snapshot.ts_ms.saturating_sub(prev_ts_ms).max(1);
        let interval_secs = Decimal::from(interval_ms) / dec!(1000);
        let accrued = if meter.marked_idle {
            Decimal::ZERO
        } else {
            interval_cost(snapshot, interval_secs, meter.environment_class, &self.rates)
        };

        meter.pending_cost += accrued;
        meter.recent_interval_costs.push((snapshot.ts_ms, accrued));
        if meter.recent_interval_costs.len() > HOURLY_ESTIMATE_WINDOW {
            meter.recent_interval_costs.remove(0);
        }

        Some(ObserveOutcome {
            is_idle_snapshot: idle,
            transition,
            accrued_cost: accrued,
        })
    }

    pub fn is_idle(&self, session: &SessionId) -> bool {
        self.sessions.lock().get(session).map(|m| m.marked_idle).unwrap_or(false)
    }

    pub fn pending_cost(&self, session: &SessionId) -> Decimal {
        self.sessions.lock().get(session).map(|m| m.pending_cost).unwrap_or(Decimal::ZERO)
    }

    /// Take (and zero) the pending cost for a commit. Returns `None` if
    /// the session isn't registered (already reaped, say).
    pub fn take_pending_cost(&self, session: &SessionId) -> Option<Decimal> {
        let mut sessions = self.sessions.lock();
        let meter = sessions.get_mut(session)?;
        let pending = meter.pending_cost;
        meter.pending_cost = Decimal::ZERO;
        Some(pending)
    }

    /// `hourly-rate estimation` (§4.5): average of the last N recorded
    /// interval costs, scaled up to a per-hour rate by each interval's
    /// actual duration rather than an assumed cadence.
    pub fn hourly_rate_estimate(&self, session: &SessionId) -> Decimal {
        let sessions = self.sessions.lock();
        let Some(meter) = sessions.get(session) else {
            return Decimal::ZERO;
        };
        if meter.recent_interval_costs.len() < 2 {
            return Decimal::ZERO;
        }
        let first_ts = meter.recent_interval_costs.first().map(|(ts, _)| *ts).unwrap_or(0);
        let last_ts = meter.recent_interval_costs.last().map(|(ts, _)| *ts).unwrap_or(0);
        let span_secs = Decimal::from(last_ts.saturating_sub(first_ts).max(1)) / dec!(1000);
        let total: Decimal = meter.recent_interval_costs.iter().map(|(_, c)| *c).sum();
        (total / span_secs) * dec!(3600)
    }

    /// `predict_remaining(balance)` (§4.5): hours of runway at the
    /// current estimated hourly rate. `None` if the rate is zero
    /// (development environment, or no usage observed yet) — runway is
    /// unbounded, not zero.
    pub fn predict_remaining(&self, session: &SessionId, balance: Decimal) -> Option<Decimal> {
        let rate = self.hourly_rate_estimate(session);
        if rate <= Decimal::ZERO {
            return None;
        }
        Some((balance / rate).max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_core::ResourceSnapshot;

    fn rates() -> RateTable {
        RateTable {
            cpu_unit_rate: dec!(0.0001),
            mem_unit_rate: dec!(0.00000001),
            gpu_unit_rate: dec!(0.001),
            io_unit_rate: dec!(0.0000001),
            bandwidth_unit_rate: dec!(0.0000001),
        }
    }

    fn meter() -> UsageMeter {
        UsageMeter::new(2.0, 10 << 20, Duration::from_secs(300), 0, rates())
    }

    fn active_snapshot(ts_ms: u64) -> ResourceSnapshot {
        ResourceSnapshot::minimal(ts_ms, 40.0, 512 << 20)
    }

    fn idle_snapshot(ts_ms: u64) -> ResourceSnapshot {
        ResourceSnapshot::minimal(ts_ms, 0.2, 5 << 20)
    }

    #[test]
    fn interval_cost_matches_documented_formula_exactly() {
        let snapshot = ResourceSnapshot {
            ts_ms: 1_000,
            cpu_percent: 50.0,
            mem_bytes: 1 << 30,
            disk_read_bytes: 1 << 20,
            disk_write_bytes: 1 << 20,
            net_rx_bytes: 1 << 20,
            net_tx_bytes: 1 << 20,
            gpu_percent: Some(25.0),
            gpu_mem_bytes: None,
            is_idle: false,
        };
        let rates = rates();
        let interval_secs = dec!(2);
        let interval_hours = interval_secs / dec!(3600);

        let expected = (dec!(0.5) * interval_hours * rates.cpu_unit_rate
            + dec!(1) * interval_hours * rates.mem_unit_rate
            + dec!(0.25) * interval_hours * rates.gpu_unit_rate
            + dec!(2) * rates.io_unit_rate
            + dec!(2) * rates.bandwidth_unit_rate)
            * EnvironmentClass::Production.multiplier();

        let actual = interval_cost(&snapshot, interval_secs, EnvironmentClass::Production, &rates);
        assert_eq!(actual, expected);
    }

    #[test]
    fn idle_classification_respects_cpu_and_mem_thresholds() {
        assert!(is_idle_snapshot(&idle_snapshot(0), EnvironmentClass::Development, 2.0, 10 << 20, 0));
        assert!(!is_idle_snapshot(&active_snapshot(0), EnvironmentClass::Development, 2.0, 10 << 20, 0));
    }

    #[test]
    fn scenario_s1_idle_reap_stops_accruing_cost_after_five_minutes() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Production);

        let mut prev_ts = 0u64;
        let mut became_idle_at = None;
        for minute in 0..=6u64 {
            let ts = minute * 60_000;
            let outcome = meter.observe(&session, &idle_snapshot(ts), prev_ts).unwrap();
            if outcome.transition == IdleTransition::BecameIdle {
                became_idle_at = Some(ts);
            }
            prev_ts = ts;
        }

        assert_eq!(became_idle_at, Some(5 * 60_000));
        assert!(meter.is_idle(&session));
    }

    #[test]
    fn active_to_idle_to_active_resets_streak() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Production);

        meter.observe(&session, &idle_snapshot(60_000), 0).unwrap();
        let outcome = meter.observe(&session, &active_snapshot(120_000), 60_000).unwrap();
        assert_eq!(outcome.transition, IdleTransition::None);
        assert!(!meter.is_idle(&session));
    }

    #[test]
    fn development_environment_accrues_no_cost() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Development);

        meter.observe(&session, &active_snapshot(1_000), 0).unwrap();
        assert_eq!(meter.pending_cost(&session), Decimal::ZERO);
    }

    #[test]
    fn production_environment_accrues_positive_cost_while_active() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Production);

        meter.observe(&session, &active_snapshot(1_000), 0).unwrap();
        assert!(meter.pending_cost(&session) > Decimal::ZERO);
    }

    #[test]
    fn take_pending_cost_zeroes_accumulator() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Production);
        meter.observe(&session, &active_snapshot(1_000), 0).unwrap();

        let taken = meter.take_pending_cost(&session).unwrap();
        assert!(taken > Decimal::ZERO);
        assert_eq!(meter.pending_cost(&session), Decimal::ZERO);
    }

    #[test]
    fn predict_remaining_is_none_without_usage() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Development);
        assert!(meter.predict_remaining(&session, dec!(100)).is_none());
    }

    #[test]
    fn predict_remaining_scales_balance_by_hourly_rate() {
        let meter = meter();
        let session = SessionId::new("sess-1");
        meter.register(session.clone(), EnvironmentClass::Production);

        for i in 0..5u64 {
            meter.observe(&session, &active_snapshot(i * 1_000), i.saturating_sub(1) * 1_000).unwrap();
        }

        let hours = meter.predict_remaining(&session, dec!(1000)).unwrap();
        assert!(hours > Decimal::ZERO);
    }
}
