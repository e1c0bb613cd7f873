// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Sandbox entity: an isolated execution environment owned by at most
//! one session at a time, created exclusively by the driver and assigned
//! exclusively by the orchestrator.

use crate::environment::EnvironmentClass;
use crate::ids::{ProjectId, UserId};
use crate::limits::ResourceLimits;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a sandbox for its entire lifetime, `creating` through `gone`.
    pub struct SandboxId;
}

/// Language/runtime and version requested for a sandbox, e.g. `("node",
/// "20")`. The pool keys warm entries by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Runtime {
    pub language: String,
    pub version: String,
}

impl Runtime {
    pub fn new(language: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.language, self.version)
    }
}

/// Lifecycle state of a sandbox. Transitions obey `creating -> running ->
/// reaping -> gone`, with `running <-> idle` permitted in between. There
/// is no path back to `creating` or out of `gone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Creating,
    Running,
    Idle,
    Reaping,
    Gone,
}

impl SandboxState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Creating, Running)
                | (Running, Idle)
                | (Idle, Running)
                | (Running, Reaping)
                | (Idle, Reaping)
                | (Creating, Reaping)
                | (Reaping, Gone)
        )
    }
}

/// Ownership and provenance metadata carried alongside a sandbox. `pooled`
/// marks an entry that currently lives in a warm pool rather than being
/// bound to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLabels {
    pub owner: UserId,
    pub project: ProjectId,
    pub session: Option<SessionId>,
    pub pooled: bool,
    pub created_at_ms: u64,
}

/// An isolated execution environment. Created exclusively by the driver;
/// assigned exclusively by the orchestrator to one session at a time.
/// The engine's own identifiers are opaque to the core and carried in
/// `engine_handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub runtime: Runtime,
    pub limits: ResourceLimits,
    pub security_profile_ref: String,
    pub state: SandboxState,
    pub engine_handle: String,
    pub labels: SandboxLabels,
}

impl Sandbox {
    /// Attempt a state transition, returning an error describing the
    /// illegal edge rather than panicking. Callers that need to mutate a
    /// stored sandbox go through this rather than assigning `state`
    /// directly, so the invariant lives in one place.
    pub fn transition(&mut self, next: SandboxState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal sandbox state transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: SandboxState,
    pub to: SandboxState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(state: SandboxState) -> Sandbox {
        Sandbox {
            id: SandboxId::new("sbx-1"),
            runtime: Runtime::new("node", "20"),
            limits: EnvironmentClass::Production.default_limits(),
            security_profile_ref: "default".to_string(),
            state,
            engine_handle: "engine-123".to_string(),
            labels: SandboxLabels {
                owner: UserId::new("user-1"),
                project: ProjectId::new("proj-1"),
                session: None,
                pooled: false,
                created_at_ms: 0,
            },
        }
    }

    #[test]
    fn legal_lifecycle_transitions_succeed() {
        let mut sbx = sandbox(SandboxState::Creating);
        sbx.transition(SandboxState::Running).unwrap();
        sbx.transition(SandboxState::Idle).unwrap();
        sbx.transition(SandboxState::Running).unwrap();
        sbx.transition(SandboxState::Reaping).unwrap();
        sbx.transition(SandboxState::Gone).unwrap();
    }

    #[test]
    fn cannot_leave_gone() {
        let mut sbx = sandbox(SandboxState::Gone);
        assert!(sbx.transition(SandboxState::Running).is_err());
    }

    #[test]
    fn cannot_skip_creating_to_idle() {
        let mut sbx = sandbox(SandboxState::Creating);
        assert!(sbx.transition(SandboxState::Idle).is_err());
    }
}
