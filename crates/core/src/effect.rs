// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects represent side effects the runtime needs to perform: calls
//! into the driver, the store, the ledger, or the wire, kept as data so
//! the components that decide "what should happen" stay separate from
//! the components that actually do it.

use crate::account::AccountId;
use crate::connection::ConnectionId;
use crate::event::Event;
use crate::ids::PtyId;
use crate::limits::ResourceLimits;
use crate::sandbox::SandboxId;
use crate::session::{SessionId, TerminationCause};
use crate::timer::TimerId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Side effects the runtime needs to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Emit an event into the system event bus / WAL.
    Emit { event: Event },

    // === Sandbox / driver effects ===
    DestroySandbox { id: SandboxId },
    ApplyLimits { id: SandboxId, limits: ResourceLimits },
    CloseAllPtys { id: SandboxId },

    // === Session effects ===
    ReapSession {
        session: SessionId,
        cause: TerminationCause,
    },

    // === Ledger effects ===
    CommitUsage {
        account: AccountId,
        amount: Decimal,
        reference: Option<String>,
    },

    // === Connection effects ===
    CloseConnection {
        connection: ConnectionId,
        close_code: u16,
        reason: String,
    },
    ClosePty {
        connection: ConnectionId,
        terminal: PtyId,
    },

    // === Timer effects ===
    StartTimer {
        id: TimerId,
        #[serde(with = "duration_ms")]
        after: Duration,
    },
    CancelTimer { id: TimerId },
}

/// Serializes a `Duration` as whole milliseconds, matching the
/// millisecond-epoch convention used throughout the event log.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_timer_round_trips_duration_as_millis() {
        let effect = Effect::StartTimer {
            id: TimerId::new("t-1"),
            after: Duration::from_millis(1_500),
        };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["StartTimer"]["after"], 1500);
        let back: Effect = serde_json::from_value(json).unwrap();
        assert_eq!(effect, back);
    }
}
