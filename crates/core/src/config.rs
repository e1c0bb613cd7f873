// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single `Config` struct is the only source of runtime parameters;
//! nothing else reads environment variables or files directly except
//! this loader. Precedence: built-in defaults < optional TOML file <
//! `DEVBOX_*` environment overrides. Cross-field constraints are
//! validated once at load time, not scattered across call sites.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Per-(runtime,version) warm pool sizing.
///
/// `high_water_percent`/`low_water_percent` are the active-to-pooled
/// demand ratio (as a percentage) the autoscale loop compares against:
/// above `high_water_percent` it grows by `scale_step` up to `max`; below
/// `low_water_percent` it shrinks back down to `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub min: u32,
    pub max: u32,
    pub reuse_age_secs: u64,
    pub high_water_percent: u32,
    pub low_water_percent: u32,
    pub scale_step: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 8,
            reuse_age_secs: 3600,
            high_water_percent: 80,
            low_water_percent: 20,
            scale_step: 2,
        }
    }
}

/// The closed set of runtime parameters consumed by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics sampler cadence.
    pub sample_interval_ms: u64,
    /// CPU percent below which a snapshot counts toward the idle streak.
    pub idle_cpu_threshold_percent: f64,
    /// Memory growth above baseline, in bytes, below which a snapshot
    /// counts toward the idle streak.
    pub idle_mem_threshold_bytes: u64,
    /// Continuous idle duration before a session is classified idle.
    pub idle_duration_threshold_secs: u64,
    /// Default memory baseline subtracted before idle classification,
    /// absent a per-environment-class override.
    pub baseline_mem_bytes: u64,
    /// Cadence at which accrued usage is committed to the ledger.
    pub credit_commit_interval_secs: u64,
    /// Health probe cadence per sandbox.
    pub health_probe_interval_secs: u64,
    /// Consecutive health probe failures tolerated before a sandbox is
    /// reaped with cause `health_check_failed`.
    pub health_probe_failure_budget: u32,
    /// Heartbeat timeout for IDE connections.
    pub heartbeat_timeout_secs: u64,
    /// Bound on the resource-snapshot ring retained per session.
    pub snapshot_ring_window_secs: u64,
    /// Bound on the outbound write queue per IDE connection before the
    /// server closes it with cause `slow_client`.
    pub writer_queue_capacity: usize,
    /// Per-(runtime,version) pool sizing, defaulted if absent from the
    /// pool_overrides map.
    pub default_pool: PoolConfig,
    /// Rate table: billing units per second of active CPU usage.
    pub cpu_unit_rate: String,
    /// Rate table: billing units per second per byte-second of memory.
    pub mem_unit_rate: String,
    /// Rate table: billing units per second of GPU usage.
    pub gpu_unit_rate: String,
    /// Rate table: billing units per byte of I/O.
    pub io_unit_rate: String,
    /// Rate table: billing units per byte of network transfer.
    pub bandwidth_unit_rate: String,
    /// Engine call deadline for sandbox creation.
    pub driver_create_timeout_secs: u64,
    /// Engine call deadline for stats collection.
    pub driver_stats_timeout_secs: u64,
    /// Unix socket or TCP address the admin CLI and wire protocol listen on.
    pub listen_addr: String,
    /// `RUST_LOG`-style filter directive for the telemetry subscriber.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            idle_cpu_threshold_percent: 2.0,
            idle_mem_threshold_bytes: 10 << 20,
            idle_duration_threshold_secs: 300,
            baseline_mem_bytes: 0,
            credit_commit_interval_secs: 60,
            health_probe_interval_secs: 15,
            health_probe_failure_budget: 3,
            heartbeat_timeout_secs: 90,
            snapshot_ring_window_secs: 600,
            writer_queue_capacity: 256,
            default_pool: PoolConfig::default(),
            cpu_unit_rate: "0.0001".to_string(),
            mem_unit_rate: "0.00000001".to_string(),
            gpu_unit_rate: "0.001".to_string(),
            io_unit_rate: "0.0000001".to_string(),
            bandwidth_unit_rate: "0.0000001".to_string(),
            driver_create_timeout_secs: 30,
            driver_stats_timeout_secs: 10,
            listen_addr: "127.0.0.1:7420".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, layer an optional TOML file over them, then layer
    /// `DEVBOX_*` environment overrides, and validate the result.
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = file_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            config = toml::from_str(&contents)
                .map_err(|e| ConfigError::ParseFile(path.display().to_string(), e.to_string()))?;
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        macro_rules! override_u64 {
            ($field:ident, $var:literal) => {
                if let Ok(raw) = std::env::var($var) {
                    self.$field = raw
                        .parse()
                        .map_err(|_| ConfigError::InvalidEnvValue($var, raw))?;
                }
            };
        }
        macro_rules! override_f64 {
            ($field:ident, $var:literal) => {
                if let Ok(raw) = std::env::var($var) {
                    self.$field = raw
                        .parse()
                        .map_err(|_| ConfigError::InvalidEnvValue($var, raw))?;
                }
            };
        }
        macro_rules! override_string {
            ($field:ident, $var:literal) => {
                if let Ok(raw) = std::env::var($var) {
                    self.$field = raw;
                }
            };
        }

        override_u64!(sample_interval_ms, "DEVBOX_SAMPLE_INTERVAL_MS");
        override_f64!(idle_cpu_threshold_percent, "DEVBOX_IDLE_CPU_THRESHOLD_PERCENT");
        override_u64!(idle_mem_threshold_bytes, "DEVBOX_IDLE_MEM_THRESHOLD_BYTES");
        override_u64!(
            idle_duration_threshold_secs,
            "DEVBOX_IDLE_DURATION_THRESHOLD_SECS"
        );
        override_u64!(baseline_mem_bytes, "DEVBOX_BASELINE_MEM_BYTES");
        override_u64!(
            credit_commit_interval_secs,
            "DEVBOX_CREDIT_COMMIT_INTERVAL_SECS"
        );
        override_u64!(
            health_probe_interval_secs,
            "DEVBOX_HEALTH_PROBE_INTERVAL_SECS"
        );
        override_u64!(heartbeat_timeout_secs, "DEVBOX_HEARTBEAT_TIMEOUT_SECS");
        override_u64!(
            snapshot_ring_window_secs,
            "DEVBOX_SNAPSHOT_RING_WINDOW_SECS"
        );
        override_string!(listen_addr, "DEVBOX_LISTEN_ADDR");
        override_string!(log_filter, "DEVBOX_LOG_FILTER");

        if let Ok(raw) = std::env::var("DEVBOX_POOL_MIN") {
            self.default_pool.min = raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue("DEVBOX_POOL_MIN", raw))?;
        }
        if let Ok(raw) = std::env::var("DEVBOX_POOL_MAX") {
            self.default_pool.max = raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue("DEVBOX_POOL_MAX", raw))?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_pool.min > self.default_pool.max {
            return Err(ConfigError::Invalid(format!(
                "default_pool.min ({}) must be <= default_pool.max ({})",
                self.default_pool.min, self.default_pool.max
            )));
        }
        if self.default_pool.low_water_percent >= self.default_pool.high_water_percent {
            return Err(ConfigError::Invalid(format!(
                "default_pool.low_water_percent ({}) must be < high_water_percent ({})",
                self.default_pool.low_water_percent, self.default_pool.high_water_percent
            )));
        }
        if self.idle_duration_threshold_secs == 0 {
            return Err(ConfigError::Invalid(
                "idle_duration_threshold_secs must be > 0".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval_ms must be > 0".to_string(),
            ));
        }
        for (name, rate) in [
            ("cpu_unit_rate", &self.cpu_unit_rate),
            ("mem_unit_rate", &self.mem_unit_rate),
            ("gpu_unit_rate", &self.gpu_unit_rate),
            ("io_unit_rate", &self.io_unit_rate),
            ("bandwidth_unit_rate", &self.bandwidth_unit_rate),
        ] {
            rate.parse::<rust_decimal::Decimal>()
                .map_err(|_| ConfigError::Invalid(format!("{name} is not a valid decimal: {rate}")))?;
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn idle_duration_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_duration_threshold_secs)
    }

    pub fn credit_commit_interval(&self) -> Duration {
        Duration::from_secs(self.credit_commit_interval_secs)
    }

    pub fn health_probe_interval(&self) -> Duration {
        Duration::from_secs(self.health_probe_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn snapshot_ring_window(&self) -> Duration {
        Duration::from_secs(self.snapshot_ring_window_secs)
    }

    /// Parsed billing-rate table (§4.5, §6). `validate()` already
    /// rejects a malformed rate string at load time, so a parse failure
    /// here can only mean a `Config` was hand-built bypassing `load`;
    /// falling back to zero is safer than panicking mid-commit.
    pub fn rate_table(&self) -> crate::environment::RateTable {
        use rust_decimal::Decimal;
        let parse = |s: &str| s.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        crate::environment::RateTable {
            cpu_unit_rate: parse(&self.cpu_unit_rate),
            mem_unit_rate: parse(&self.mem_unit_rate),
            gpu_unit_rate: parse(&self.gpu_unit_rate),
            io_unit_rate: parse(&self.io_unit_rate),
            bandwidth_unit_rate: parse(&self.bandwidth_unit_rate),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, String),
    #[error("failed to parse config file {0}: {1}")]
    ParseFile(String, String),
    #[error("invalid value for {0}: {1}")]
    InvalidEnvValue(&'static str, String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
