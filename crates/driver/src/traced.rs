// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced wrapper for consistent observability around any `SandboxDriver`.

use crate::error::DriverError;
use crate::spec::SandboxSpec;
use crate::streams::{ExecStreams, PtyHandle};
use crate::{CheckpointRef, RawStats, SandboxDriver, SandboxHandle};
use async_trait::async_trait;
use devbox_core::ResourceLimits;
use tracing::Instrument;

/// Wrapper that adds tracing spans to any `SandboxDriver`.
#[derive(Clone)]
pub struct TracedDriver<D> {
    inner: D,
}

impl<D> TracedDriver<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D: SandboxDriver> SandboxDriver for TracedDriver<D> {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, DriverError> {
        async {
            tracing::info!(image = %spec.image, "creating sandbox");
            let start = std::time::Instant::now();
            let result = self.inner.create(spec).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(h) => tracing::info!(sandbox_id = %h.id, elapsed_ms, "sandbox created"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "create failed"),
            }
            result
        }
        .instrument(tracing::info_span!("driver.create"))
        .await
    }

    async fn start(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        let span = tracing::info_span!("driver.start", sandbox_id = %handle.id);
        async {
            let result = self.inner.start(handle).await;
            if let Err(ref e) = result {
                tracing::error!(error = %e, "start failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        let result = self.inner.stop(handle).await;
        tracing::info_span!("driver.stop", sandbox_id = %handle.id).in_scope(|| match &result {
            Ok(()) => tracing::info!("stopped"),
            Err(e) => tracing::warn!(error = %e, "stop failed"),
        });
        result
    }

    async fn delete(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        let result = self.inner.delete(handle).await;
        tracing::info_span!("driver.delete", sandbox_id = %handle.id).in_scope(|| match &result {
            Ok(()) => tracing::info!("deleted"),
            Err(e) => tracing::warn!(error = %e, "delete failed (may be expected)"),
        });
        result
    }

    async fn update_limits(
        &self,
        handle: &SandboxHandle,
        limits: ResourceLimits,
    ) -> Result<(), DriverError> {
        let result = self.inner.update_limits(handle, limits).await;
        if let Err(ref e) = result {
            tracing::error!(sandbox_id = %handle.id, error = %e, "update_limits failed");
        }
        result
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        cmd: &[String],
        env: &[(String, String)],
        tty: bool,
        cwd: Option<&str>,
    ) -> Result<ExecStreams, DriverError> {
        tracing::info_span!("driver.exec", sandbox_id = %handle.id, tty)
            .in_scope(|| tracing::debug!(cmd = ?cmd, env_count = env.len(), "exec"));
        let result = self.inner.exec(handle, cmd, env, tty, cwd).await;
        if let Err(ref e) = result {
            tracing::error!(sandbox_id = %handle.id, error = %e, "exec failed");
        }
        result
    }

    async fn open_pty(
        &self,
        handle: &SandboxHandle,
        cols: u16,
        rows: u16,
        shell: &str,
    ) -> Result<PtyHandle, DriverError> {
        let result = self.inner.open_pty(handle, cols, rows, shell).await;
        tracing::info_span!("driver.open_pty", sandbox_id = %handle.id, cols, rows).in_scope(
            || match &result {
                Ok(_) => tracing::info!("pty opened"),
                Err(e) => tracing::error!(error = %e, "open_pty failed"),
            },
        );
        result
    }

    async fn put_archive(
        &self,
        handle: &SandboxHandle,
        path: &str,
        tar_bytes: Vec<u8>,
    ) -> Result<(), DriverError> {
        let len = tar_bytes.len();
        let result = self.inner.put_archive(handle, path, tar_bytes).await;
        tracing::info_span!("driver.put_archive", sandbox_id = %handle.id, path, len).in_scope(
            || {
                if let Err(ref e) = result {
                    tracing::error!(error = %e, "put_archive failed");
                }
            },
        );
        result
    }

    async fn get_archive(
        &self,
        handle: &SandboxHandle,
        path: &str,
    ) -> Result<Vec<u8>, DriverError> {
        let result = self.inner.get_archive(handle, path).await;
        tracing::info_span!("driver.get_archive", sandbox_id = %handle.id, path).in_scope(
            || match &result {
                Ok(bytes) => tracing::debug!(len = bytes.len(), "archive fetched"),
                Err(e) => tracing::error!(error = %e, "get_archive failed"),
            },
        );
        result
    }

    async fn sample_stats(&self, handle: &SandboxHandle) -> Result<RawStats, DriverError> {
        let result = self.inner.sample_stats(handle).await;
        tracing::trace!(sandbox_id = %handle.id, ok = result.is_ok(), "sampled");
        result
    }

    async fn checkpoint(
        &self,
        handle: &SandboxHandle,
    ) -> Result<Option<CheckpointRef>, DriverError> {
        let result = self.inner.checkpoint(handle).await;
        tracing::info_span!("driver.checkpoint", sandbox_id = %handle.id).in_scope(
            || match &result {
                Ok(Some(_)) => tracing::info!("checkpointed"),
                Ok(None) => tracing::debug!("checkpoint unsupported, caller should fall back"),
                Err(e) => tracing::error!(error = %e, "checkpoint failed"),
            },
        );
        result
    }

    async fn restore(&self, checkpoint: &CheckpointRef) -> Result<SandboxHandle, DriverError> {
        let result = self.inner.restore(checkpoint).await;
        tracing::info_span!("driver.restore", checkpoint = %checkpoint.0).in_scope(
            || match &result {
                Ok(h) => tracing::info!(sandbox_id = %h.id, "restored"),
                Err(e) => tracing::error!(error = %e, "restore failed"),
            },
        );
        result
    }
}
