// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment classes: the closed category a session is created under,
//! selecting both default sandbox sizing and the billing-rate multiplier
//! the usage meter applies to every sampled resource snapshot.

use crate::limits::ResourceLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A named environment class. New classes are added here, not invented
/// ad hoc by callers, so the billing multiplier table and the
/// orchestrator's default limits stay in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentClass {
    Development,
    Staging,
    Production,
    Gpu,
    HighMemory,
}

impl EnvironmentClass {
    pub const ALL: [EnvironmentClass; 5] = [
        EnvironmentClass::Development,
        EnvironmentClass::Staging,
        EnvironmentClass::Production,
        EnvironmentClass::Gpu,
        EnvironmentClass::HighMemory,
    ];

    /// Default resource limits applied at sandbox creation unless the
    /// caller overrides them, subject to the account's plan ceiling.
    pub fn default_limits(self) -> ResourceLimits {
        match self {
            EnvironmentClass::Development => ResourceLimits::new(512, 1 << 30, 128, 25 << 20),
            EnvironmentClass::Staging => ResourceLimits::new(1024, 2 << 30, 256, 50 << 20),
            EnvironmentClass::Production => ResourceLimits::new(2048, 4 << 30, 512, 100 << 20),
            EnvironmentClass::Gpu => ResourceLimits::new(4096, 8 << 30, 512, 200 << 20),
            EnvironmentClass::HighMemory => ResourceLimits::new(1024, 16 << 30, 256, 50 << 20),
        }
    }

    /// The fixed billing-rate multiplier the usage meter applies to the
    /// per-second unit-rate cost of every sampled snapshot. `development`
    /// is free; the rest scale the shared rate table up from there.
    pub fn multiplier(self) -> Decimal {
        match self {
            EnvironmentClass::Development => dec!(0),
            EnvironmentClass::Staging => dec!(0.5),
            EnvironmentClass::Production => dec!(1),
            EnvironmentClass::Gpu => dec!(5),
            EnvironmentClass::HighMemory => dec!(2),
        }
    }

    /// Per-class override of the usage meter's idle-memory baseline
    /// subtraction. `None` means the meter's global default (0) applies.
    pub fn baseline_mem_bytes(self) -> Option<u64> {
        match self {
            EnvironmentClass::HighMemory => Some(256 << 20),
            EnvironmentClass::Gpu => Some(128 << 20),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentClass::Development => "development",
            EnvironmentClass::Staging => "staging",
            EnvironmentClass::Production => "production",
            EnvironmentClass::Gpu => "gpu",
            EnvironmentClass::HighMemory => "high_memory",
        }
    }
}

impl std::fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnvironmentClass {
    type Err = EnvironmentClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(EnvironmentClass::Development),
            "staging" => Ok(EnvironmentClass::Staging),
            "production" => Ok(EnvironmentClass::Production),
            "gpu" => Ok(EnvironmentClass::Gpu),
            "high_memory" => Ok(EnvironmentClass::HighMemory),
            other => Err(EnvironmentClassParseError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown environment class: {0}")]
pub struct EnvironmentClassParseError(String);

/// Parsed billing-rate constants (§4.5, §6), computed once from
/// `Config`'s string fields rather than re-parsed on every snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTable {
    pub cpu_unit_rate: Decimal,
    pub mem_unit_rate: Decimal,
    pub gpu_unit_rate: Decimal,
    pub io_unit_rate: Decimal,
    pub bandwidth_unit_rate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn development_is_free() {
        assert_eq!(EnvironmentClass::Development.multiplier(), dec!(0));
    }

    #[test]
    fn gpu_is_most_expensive() {
        let max = EnvironmentClass::ALL
            .iter()
            .map(|c| c.multiplier())
            .max()
            .unwrap();
        assert_eq!(max, EnvironmentClass::Gpu.multiplier());
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        for class in EnvironmentClass::ALL {
            let parsed = EnvironmentClass::from_str(&class.to_string()).unwrap();
            assert_eq!(parsed, class);
        }
    }

    #[test]
    fn rejects_unknown_class() {
        assert!(EnvironmentClass::from_str("huge").is_err());
    }
}
