// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Abstraction over the external container/microVM engine (§4.1). The core
//! treats the engine's own identifiers opaquely; this crate is the only
//! place that knows how to actually create, start, stop, exec into, or
//! archive-transfer a sandbox.
//!
//! Mount validation and environment sanitization live above the trait in
//! [`mounts`] rather than inside any one implementation, so every
//! `SandboxDriver` gets them for free by calling through the same helpers
//! from its own `create`.

pub mod docker;
pub mod error;
pub mod mounts;
pub mod spec;
pub mod streams;
pub mod subprocess;
mod traced;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use docker::DockerDriver;
pub use error::DriverError;
pub use mounts::{sanitize_env, validate_mount, MountPolicy};
pub use spec::SandboxSpec;
pub use streams::{ExecStreams, PtyHandle};
pub use traced::TracedDriver;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{DriverCall, FakeDriver};

use async_trait::async_trait;
use devbox_core::{ResourceLimits, SandboxId};
use serde::{Deserialize, Serialize};

/// Raw stats as reported by the engine, before the Metrics Sampler derives
/// `cpu_percent` from two consecutive samples (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawStats {
    pub cpu_usage_ns: u64,
    pub system_cpu_ns: u64,
    pub mem_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub gpu_percent: Option<f64>,
    pub gpu_mem_bytes: Option<u64>,
}

/// Opaque reference to a point-in-time checkpoint of a sandbox, returned by
/// `checkpoint` and consumed by `restore`. Not every engine supports this;
/// callers fall back to `create` + archive transfer when it doesn't (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef(pub String);

/// The engine-facing handle for a created sandbox: its core id plus the
/// engine's own opaque identifier, carried in `Sandbox::engine_handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    pub id: SandboxId,
    pub engine_handle: String,
}

impl SandboxHandle {
    pub fn new(id: SandboxId, engine_handle: impl Into<String>) -> Self {
        Self {
            id,
            engine_handle: engine_handle.into(),
        }
    }
}

/// Abstraction over the external container/microVM engine (§4.1).
///
/// Every method here is async and cancellable; implementations must honor
/// the deadlines the caller applies via `tokio::time::timeout` rather than
/// assuming their own internal timeout is sufficient (§5, §4.10).
#[async_trait]
pub trait SandboxDriver: Clone + Send + Sync + 'static {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, DriverError>;

    async fn start(&self, handle: &SandboxHandle) -> Result<(), DriverError>;

    async fn stop(&self, handle: &SandboxHandle) -> Result<(), DriverError>;

    async fn delete(&self, handle: &SandboxHandle) -> Result<(), DriverError>;

    /// MUST take effect without a restart; failure to hot-apply is an
    /// error, never a silent restart (§4.1).
    async fn update_limits(
        &self,
        handle: &SandboxHandle,
        limits: ResourceLimits,
    ) -> Result<(), DriverError>;

    async fn exec(
        &self,
        handle: &SandboxHandle,
        cmd: &[String],
        env: &[(String, String)],
        tty: bool,
        cwd: Option<&str>,
    ) -> Result<ExecStreams, DriverError>;

    async fn open_pty(
        &self,
        handle: &SandboxHandle,
        cols: u16,
        rows: u16,
        shell: &str,
    ) -> Result<PtyHandle, DriverError>;

    async fn put_archive(
        &self,
        handle: &SandboxHandle,
        path: &str,
        tar_bytes: Vec<u8>,
    ) -> Result<(), DriverError>;

    async fn get_archive(&self, handle: &SandboxHandle, path: &str)
        -> Result<Vec<u8>, DriverError>;

    async fn sample_stats(&self, handle: &SandboxHandle) -> Result<RawStats, DriverError>;

    /// Optional; implementations that can't snapshot in place return `Ok(None)`
    /// so callers fall back to `create` + archive transfer.
    async fn checkpoint(&self, handle: &SandboxHandle)
        -> Result<Option<CheckpointRef>, DriverError>;

    async fn restore(&self, checkpoint: &CheckpointRef) -> Result<SandboxHandle, DriverError>;
}
