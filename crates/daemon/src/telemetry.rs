// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics registry (§4.11, §6): the counters/gauges the spec names
//! (`sandboxes_created`, `sandboxes_destroyed`, `active_sandboxes`,
//! `pool_size{key}`, `sandbox_create_latency`, `credit_commits`,
//! `credit_exhaustion_events`), populated by the same call sites that
//! already log these events rather than derived after the fact. Exposed
//! for scraping via [`Metrics::render`]; nothing in this crate binds an
//! HTTP endpoint for it (the REST surface is out of scope per §1), so a
//! caller wires that up however its deployment prefers.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::time::Duration;

pub struct Metrics {
    registry: Registry,
    sandboxes_created: IntCounter,
    sandboxes_destroyed: IntCounter,
    active_sandboxes: IntGauge,
    pool_size: IntGaugeVec,
    sandbox_create_latency: Histogram,
    credit_commits: IntCounter,
    credit_exhaustion_events: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sandboxes_created =
            IntCounter::with_opts(Opts::new("sandboxes_created", "Total sandboxes created"))?;
        let sandboxes_destroyed =
            IntCounter::with_opts(Opts::new("sandboxes_destroyed", "Total sandboxes destroyed"))?;
        let active_sandboxes =
            IntGauge::with_opts(Opts::new("active_sandboxes", "Sandboxes currently running or idle"))?;
        let pool_size = IntGaugeVec::new(
            Opts::new("pool_size", "Warm sandboxes idle in a pool, per runtime key"),
            &["key"],
        )?;
        let sandbox_create_latency = Histogram::with_opts(
            HistogramOpts::new("sandbox_create_latency", "Seconds to assign a sandbox")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        let credit_commits =
            IntCounter::with_opts(Opts::new("credit_commits", "Successful usage-meter ledger commits"))?;
        let credit_exhaustion_events = IntCounter::with_opts(Opts::new(
            "credit_exhaustion_events",
            "Commits rejected with insufficient_balance",
        ))?;

        registry.register(Box::new(sandboxes_created.clone()))?;
        registry.register(Box::new(sandboxes_destroyed.clone()))?;
        registry.register(Box::new(active_sandboxes.clone()))?;
        registry.register(Box::new(pool_size.clone()))?;
        registry.register(Box::new(sandbox_create_latency.clone()))?;
        registry.register(Box::new(credit_commits.clone()))?;
        registry.register(Box::new(credit_exhaustion_events.clone()))?;

        Ok(Self {
            registry,
            sandboxes_created,
            sandboxes_destroyed,
            active_sandboxes,
            pool_size,
            sandbox_create_latency,
            credit_commits,
            credit_exhaustion_events,
        })
    }

    /// A sandbox just finished `create` (fresh or repurposed from a
    /// pool) and is now running (§4.2/§4.3's `assign`).
    pub fn record_sandbox_created(&self, latency: Duration) {
        self.sandboxes_created.inc();
        self.active_sandboxes.inc();
        self.sandbox_create_latency.observe(latency.as_secs_f64());
    }

    /// A sandbox reached `gone`, whether via reap or an admin-forced
    /// destroy (§4.3).
    pub fn record_sandbox_destroyed(&self) {
        self.sandboxes_destroyed.inc();
        self.active_sandboxes.dec();
    }

    /// Snapshot the idle count for one pool key (§4.2: `pool_size{key}`).
    pub fn set_pool_size(&self, key: &str, idle_count: u32) {
        self.pool_size.with_label_values(&[key]).set(i64::from(idle_count));
    }

    /// A usage-meter commit succeeded (§4.5).
    pub fn record_credit_commit(&self) {
        self.credit_commits.inc();
    }

    /// A usage-meter commit was rejected with `insufficient_balance`
    /// (§4.6, §7).
    pub fn record_credit_exhaustion(&self) {
        self.credit_exhaustion_events.inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        // Only fails on a non-UTF8 metric name/label, which can't happen
        // here since every name/label above is a fixed ASCII literal.
        let _ = encoder.encode(&self.registry.gather(), &mut buffer);
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_create_increments_counter_and_active_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.record_sandbox_created(Duration::from_millis(250));
        let rendered = metrics.render();
        assert!(rendered.contains("sandboxes_created 1"));
        assert!(rendered.contains("active_sandboxes 1"));
    }

    #[test]
    fn sandbox_destroyed_decrements_active_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.record_sandbox_created(Duration::from_millis(10));
        metrics.record_sandbox_destroyed();
        let rendered = metrics.render();
        assert!(rendered.contains("sandboxes_destroyed 1"));
        assert!(rendered.contains("active_sandboxes 0"));
    }

    #[test]
    fn pool_size_is_labeled_per_key() {
        let metrics = Metrics::new().unwrap();
        metrics.set_pool_size("python:3.11", 2);
        metrics.set_pool_size("node:20", 5);
        let rendered = metrics.render();
        assert!(rendered.contains(r#"pool_size{key="python:3.11"} 2"#));
        assert!(rendered.contains(r#"pool_size{key="node:20"} 5"#));
    }

    #[test]
    fn credit_commit_and_exhaustion_counters_are_independent() {
        let metrics = Metrics::new().unwrap();
        metrics.record_credit_commit();
        metrics.record_credit_commit();
        metrics.record_credit_exhaustion();
        let rendered = metrics.render();
        assert!(rendered.contains("credit_commits 2"));
        assert!(rendered.contains("credit_exhaustion_events 1"));
    }
}
