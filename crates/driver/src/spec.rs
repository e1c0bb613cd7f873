// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! What the orchestrator asks the driver to create.

use devbox_core::{ResourceLimits, SecurityProfile};

/// A mount from the host (or a prior checkpoint's volume) into the
/// sandbox. `source` MUST resolve under an allowed prefix and `target`
/// MUST NOT fall under a blocked one; see [`crate::mounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub readonly: bool,
}

/// Everything the driver needs to create a sandbox (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    pub limits: ResourceLimits,
    pub security_profile: SecurityProfile,
    pub mounts: Vec<Mount>,
}

impl SandboxSpec {
    pub fn new(
        image: impl Into<String>,
        command: Vec<String>,
        limits: ResourceLimits,
        security_profile: SecurityProfile,
    ) -> Self {
        Self {
            image: image.into(),
            command,
            env: Vec::new(),
            labels: Vec::new(),
            limits,
            security_profile,
            mounts: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_mounts(mut self, mounts: Vec<Mount>) -> Self {
        self.mounts = mounts;
        self
    }
}
