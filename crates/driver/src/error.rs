// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure modes a [`crate::SandboxDriver`] can surface. Named per §7's
//! taxonomy where the driver is the source; everything else is scoped to
//! this crate's own responsibility rather than a catch-all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("mount or archive path outside allowed set: {0}")]
    InvalidPath(String),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engine call timed out after {0}s")]
    Timeout(u64),

    #[error("sandbox not found: {0}")]
    NotFound(String),

    #[error("checkpoint not supported by this driver")]
    CheckpointUnsupported,

    #[error("malformed engine response: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DriverError {
    /// Errors worth a bounded retry before surfacing (§7: `engine_unavailable`).
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::EngineUnavailable(_) | DriverError::Timeout(_))
    }
}
