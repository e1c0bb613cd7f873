// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic in-memory `SandboxDriver`, used by every other
//! component's tests (§4.1: "an in-process fake (deterministic,
//! in-memory, used by every other component's tests)").

use crate::error::DriverError;
use crate::mounts::{self, MountPolicy};
use crate::spec::SandboxSpec;
use crate::streams::{Chunk, ExecStreams, PtyHandle};
use crate::{CheckpointRef, RawStats, SandboxDriver, SandboxHandle};
use async_trait::async_trait;
use devbox_core::{ResourceLimits, SandboxId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One recorded call, in invocation order, for assertions in dependent
/// crates' tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Create(String),
    Start(SandboxId),
    Stop(SandboxId),
    Delete(SandboxId),
    UpdateLimits(SandboxId, ResourceLimits),
    Exec(SandboxId),
    OpenPty(SandboxId),
    PutArchive(SandboxId, String),
    GetArchive(SandboxId, String),
    SampleStats(SandboxId),
    Checkpoint(SandboxId),
    Restore(String),
}

#[derive(Debug, Clone)]
struct FakeEntry {
    handle: SandboxHandle,
    limits: ResourceLimits,
    stats: RawStats,
    deleted: bool,
}

struct FakeState {
    entries: HashMap<String, FakeEntry>,
    checkpoints: HashMap<String, SandboxHandle>,
    calls: Vec<DriverCall>,
    next_id: u64,
    policy: MountPolicy,
    fail_next_create: bool,
    checkpoints_disabled: bool,
    fail_sample_stats_countdown: u32,
    fail_not_found_next_sample_stats: bool,
}

/// An in-memory driver. Every sandbox it creates lives purely in process
/// memory; `sample_stats` returns whatever was last set with
/// [`FakeDriver::set_stats`], defaulting to zeroed stats.
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                entries: HashMap::new(),
                checkpoints: HashMap::new(),
                calls: Vec::new(),
                next_id: 1,
                policy: MountPolicy::default(),
                fail_next_create: false,
                checkpoints_disabled: false,
                fail_sample_stats_countdown: 0,
                fail_not_found_next_sample_stats: false,
            })),
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn set_stats(&self, handle: &SandboxHandle, stats: RawStats) {
        if let Some(entry) = self.state.lock().entries.get_mut(handle.engine_handle.as_str()) {
            entry.stats = stats;
        }
    }

    /// The next call to `sample_stats`, for any handle, fails with
    /// `NotFound` regardless of whether the handle is otherwise live —
    /// simulates the engine reporting the sandbox gone out from under a
    /// still-registered sampler (§4.4).
    pub fn fail_not_found_next_sample_stats(&self) {
        self.state.lock().fail_not_found_next_sample_stats = true;
    }

    pub fn fail_next_create(&self) {
        self.state.lock().fail_next_create = true;
    }

    /// Simulate an engine that cannot checkpoint in place, forcing
    /// `checkpoint()` to return `Ok(None)` so callers fall back to
    /// create + archive transfer.
    pub fn disable_checkpoints(&self) {
        self.state.lock().checkpoints_disabled = true;
    }

    /// The next `count` calls to `sample_stats` fail with a transient
    /// `EngineUnavailable`, for exercising health-probe failure budgets.
    pub fn fail_next_sample_stats(&self, count: u32) {
        self.state.lock().fail_sample_stats_countdown = count;
    }

    pub fn is_deleted(&self, handle: &SandboxHandle) -> bool {
        self.state
            .lock()
            .entries
            .get(handle.engine_handle.as_str())
            .map(|e| e.deleted)
            .unwrap_or(true)
    }
}

#[async_trait]
impl SandboxDriver for FakeDriver {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, DriverError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_create) {
            return Err(DriverError::EngineUnavailable("fake: forced failure".to_string()));
        }
        for mount in &spec.mounts {
            mounts::validate_mount(mount, &state.policy)?;
        }
        let id = state.next_id;
        state.next_id += 1;
        let engine_handle = format!("fake-{id}");
        let handle = SandboxHandle::new(SandboxId::new(format!("sbx-{id}")), engine_handle.clone());
        state.entries.insert(
            engine_handle.clone(),
            FakeEntry {
                handle: handle.clone(),
                limits: spec.limits,
                stats: RawStats::default(),
                deleted: false,
            },
        );
        state.calls.push(DriverCall::Create(spec.image.clone()));
        Ok(handle)
    }

    async fn start(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        self.state.lock().calls.push(DriverCall::Start(handle.id.clone()));
        Ok(())
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        self.state.lock().calls.push(DriverCall::Stop(handle.id.clone()));
        Ok(())
    }

    async fn delete(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(handle.engine_handle.as_str()) {
            entry.deleted = true;
        }
        state.calls.push(DriverCall::Delete(handle.id.clone()));
        Ok(())
    }

    async fn update_limits(
        &self,
        handle: &SandboxHandle,
        limits: ResourceLimits,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(handle.engine_handle.as_str())
            .ok_or_else(|| DriverError::NotFound(handle.engine_handle.clone()))?;
        entry.limits = limits;
        state.calls.push(DriverCall::UpdateLimits(handle.id.clone(), limits));
        Ok(())
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        _cmd: &[String],
        _env: &[(String, String)],
        _tty: bool,
        _cwd: Option<&str>,
    ) -> Result<ExecStreams, DriverError> {
        self.state.lock().calls.push(DriverCall::Exec(handle.id.clone()));
        let (stdin_tx, _stdin_rx) = tokio::sync::mpsc::channel(8);
        let (stdout_tx, stdout_rx) = tokio::sync::mpsc::channel(8);
        let (_stderr_tx, stderr_rx) = tokio::sync::mpsc::channel(8);
        let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
        let _ = stdout_tx.send(Ok(Chunk::Eof)).await;
        let _ = exit_tx.send(0);
        Ok(ExecStreams {
            stdin: stdin_tx,
            stdout: stdout_rx,
            stderr: stderr_rx,
            exit_code: exit_rx,
        })
    }

    async fn open_pty(
        &self,
        handle: &SandboxHandle,
        _cols: u16,
        _rows: u16,
        _shell: &str,
    ) -> Result<PtyHandle, DriverError> {
        self.state.lock().calls.push(DriverCall::OpenPty(handle.id.clone()));
        let (input_tx, _input_rx) = tokio::sync::mpsc::channel(8);
        let (_output_tx, output_rx) = tokio::sync::mpsc::channel(8);
        let (resize_tx, _resize_rx) = tokio::sync::mpsc::channel(8);
        let (close_tx, _close_rx) = tokio::sync::oneshot::channel();
        Ok(PtyHandle::new(input_tx, output_rx, resize_tx, close_tx))
    }

    async fn put_archive(
        &self,
        handle: &SandboxHandle,
        path: &str,
        _tar_bytes: Vec<u8>,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        mounts::validate_archive_path(path, &state.policy)?;
        state
            .calls
            .push(DriverCall::PutArchive(handle.id.clone(), path.to_string()));
        Ok(())
    }

    async fn get_archive(&self, handle: &SandboxHandle, path: &str) -> Result<Vec<u8>, DriverError> {
        let mut state = self.state.lock();
        mounts::validate_archive_path(path, &state.policy)?;
        state
            .calls
            .push(DriverCall::GetArchive(handle.id.clone(), path.to_string()));
        Ok(Vec::new())
    }

    async fn sample_stats(&self, handle: &SandboxHandle) -> Result<RawStats, DriverError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_not_found_next_sample_stats) {
            return Err(DriverError::NotFound(handle.engine_handle.clone()));
        }
        if state.fail_sample_stats_countdown > 0 {
            state.fail_sample_stats_countdown -= 1;
            return Err(DriverError::EngineUnavailable("fake: forced sample_stats failure".to_string()));
        }
        let stats = state
            .entries
            .get(handle.engine_handle.as_str())
            .map(|e| e.stats)
            .ok_or_else(|| DriverError::NotFound(handle.engine_handle.clone()))?;
        state.calls.push(DriverCall::SampleStats(handle.id.clone()));
        Ok(stats)
    }

    async fn checkpoint(
        &self,
        handle: &SandboxHandle,
    ) -> Result<Option<CheckpointRef>, DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Checkpoint(handle.id.clone()));
        if state.checkpoints_disabled {
            return Ok(None);
        }
        let checkpoint_id = format!("ckpt-{}", handle.engine_handle);
        state.checkpoints.insert(checkpoint_id.clone(), handle.clone());
        Ok(Some(CheckpointRef(checkpoint_id)))
    }

    async fn restore(&self, checkpoint: &CheckpointRef) -> Result<SandboxHandle, DriverError> {
        let mut state = self.state.lock();
        let original = state
            .checkpoints
            .get(&checkpoint.0)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(checkpoint.0.clone()))?;
        let id = state.next_id;
        state.next_id += 1;
        let engine_handle = format!("fake-{id}");
        let restored = SandboxHandle::new(SandboxId::new(format!("sbx-{id}")), engine_handle.clone());
        let source = state.entries.get(original.engine_handle.as_str()).cloned();
        state.entries.insert(
            engine_handle,
            FakeEntry {
                handle: restored.clone(),
                limits: source.map(|e| e.limits).unwrap_or(ResourceLimits::new(0, 0, 0, 0)),
                stats: RawStats::default(),
                deleted: false,
            },
        );
        state.calls.push(DriverCall::Restore(checkpoint.0.clone()));
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_core::SecurityProfile;

    fn spec() -> SandboxSpec {
        SandboxSpec::new(
            "node:20",
            vec!["node".to_string()],
            ResourceLimits::new(512, 1 << 30, 256, 50_000_000),
            SecurityProfile::locked_down("default"),
        )
    }

    #[tokio::test]
    async fn create_then_delete_marks_deleted() {
        let driver = FakeDriver::new();
        let handle = driver.create(&spec()).await.unwrap();
        assert!(!driver.is_deleted(&handle));
        driver.delete(&handle).await.unwrap();
        assert!(driver.is_deleted(&handle));
    }

    #[tokio::test]
    async fn fail_next_create_surfaces_engine_unavailable() {
        let driver = FakeDriver::new();
        driver.fail_next_create();
        let err = driver.create(&spec()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn update_limits_persists_for_subsequent_reads() {
        let driver = FakeDriver::new();
        let handle = driver.create(&spec()).await.unwrap();
        let new_limits = ResourceLimits::new(1024, 2 << 30, 512, 100_000_000);
        driver.update_limits(&handle, new_limits).await.unwrap();
        assert_eq!(
            driver.calls().last(),
            Some(&DriverCall::UpdateLimits(handle.id.clone(), new_limits))
        );
    }

    #[tokio::test]
    async fn checkpoint_then_restore_yields_new_handle() {
        let driver = FakeDriver::new();
        let handle = driver.create(&spec()).await.unwrap();
        let checkpoint = driver.checkpoint(&handle).await.unwrap().unwrap();
        let restored = driver.restore(&checkpoint).await.unwrap();
        assert_ne!(restored.id, handle.id);
    }

    #[tokio::test]
    async fn disabled_checkpoints_return_none() {
        let driver = FakeDriver::new();
        driver.disable_checkpoints();
        let handle = driver.create(&spec()).await.unwrap();
        assert!(driver.checkpoint(&handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_next_sample_stats_exhausts_after_count() {
        let driver = FakeDriver::new();
        let handle = driver.create(&spec()).await.unwrap();
        driver.fail_next_sample_stats(2);
        assert!(driver.sample_stats(&handle).await.is_err());
        assert!(driver.sample_stats(&handle).await.is_err());
        assert!(driver.sample_stats(&handle).await.is_ok());
    }

    #[tokio::test]
    async fn put_archive_rejects_blocked_target() {
        let driver = FakeDriver::new();
        let handle = driver.create(&spec()).await.unwrap();
        let err = driver
            .put_archive(&handle, "/proc/1/mem", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidPath(_)));
    }
}
