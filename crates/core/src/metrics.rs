// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource Snapshot: one timestamped resource-usage observation for a
//! session, produced by the metrics sampler at a fixed cadence and
//! consumed by the usage meter to derive idleness and cost.

use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// One sampled observation of a session's resource usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub ts_ms: u64,
    pub cpu_percent: f64,
    pub mem_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub gpu_percent: Option<f64>,
    pub gpu_mem_bytes: Option<u64>,
    pub is_idle: bool,
}

impl ResourceSnapshot {
    /// A snapshot carrying only the fields that matter for tests that
    /// don't exercise GPU metrics.
    #[cfg(any(test, feature = "test-support"))]
    pub fn minimal(ts_ms: u64, cpu_percent: f64, mem_bytes: u64) -> Self {
        Self {
            ts_ms,
            cpu_percent,
            mem_bytes,
            disk_read_bytes: 0,
            disk_write_bytes: 0,
            net_rx_bytes: 0,
            net_tx_bytes: 0,
            gpu_percent: None,
            gpu_mem_bytes: None,
            is_idle: false,
        }
    }
}

/// A session-scoped snapshot envelope, used where the ring buffer and
/// store need the owning session alongside the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_ref: SessionId,
    pub snapshot: ResourceSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_snapshot_defaults_gpu_fields_to_none() {
        let snap = ResourceSnapshot::minimal(1_000, 0.5, 1 << 20);
        assert!(snap.gpu_percent.is_none());
        assert!(!snap.is_idle);
    }
}
