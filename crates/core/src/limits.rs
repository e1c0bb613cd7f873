// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource limits and security profile passed through to the sandbox engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hot-appliable resource limits for a sandbox.
///
/// `update_limits` on the driver MUST apply these without a restart; the
/// orchestrator never silently falls back to a restart on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_shares: u32,
    pub mem_bytes: u64,
    pub pids: u32,
    pub io_bps: u64,
}

impl ResourceLimits {
    pub const fn new(cpu_shares: u32, mem_bytes: u64, pids: u32, io_bps: u64) -> Self {
        Self {
            cpu_shares,
            mem_bytes,
            pids,
            io_bps,
        }
    }
}

/// Network mode passed through to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    None,
    Bridge,
    Host,
}

/// Closed enumeration of isolation settings passed opaquely to the engine.
///
/// The driver never interprets these beyond forwarding them; mount
/// validation (allowed/blocked prefixes) is enforced above the driver
/// trait so every implementation gets it for free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityProfile {
    pub name: String,
    pub dropped_capabilities: Vec<String>,
    pub added_capabilities: Vec<String>,
    pub seccomp_profile: Option<String>,
    pub apparmor_profile: Option<String>,
    pub readonly_rootfs: bool,
    pub tmpfs_mounts: Vec<PathBuf>,
    pub network_mode: NetworkMode,
}

impl SecurityProfile {
    /// A conservative default: all capabilities dropped, read-only root,
    /// no network.
    pub fn locked_down(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dropped_capabilities: vec!["ALL".to_string()],
            added_capabilities: Vec::new(),
            seccomp_profile: Some("default".to_string()),
            apparmor_profile: None,
            readonly_rootfs: true,
            tmpfs_mounts: vec![PathBuf::from("/tmp")],
            network_mode: NetworkMode::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_down_profile_has_no_network() {
        let profile = SecurityProfile::locked_down("default");
        assert_eq!(profile.network_mode, NetworkMode::None);
        assert!(profile.readonly_rootfs);
    }

    #[test]
    fn resource_limits_are_copy() {
        let a = ResourceLimits::new(512, 1 << 30, 256, 50_000_000);
        let b = a;
        assert_eq!(a, b);
    }
}
