// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers for the CLI-shelling driver implementation.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for container create/start calls.
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for stop/delete teardown calls.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for a stats poll. Kept short since the sampler runs
/// on a sub-second cadence and a slow poll should fail fast rather than
/// pile up (§4.4).
pub const STATS_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for archive put/get.
pub const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for hot limit updates.
pub const UPDATE_LIMITS_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child process
/// is killed automatically if the timeout elapses (via the tokio `Child`
/// drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}
