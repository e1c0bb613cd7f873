// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold byte streams for exec and PTY I/O (§9: "the core treats them as
//! cold byte streams with a `next() -> bytes | eof | err` contract"). The
//! daemon's IDE multiplexer drains these and re-frames them as wire
//! messages; nothing in this crate knows about the wire format.

use crate::error::DriverError;
use tokio::sync::{mpsc, oneshot};

/// One chunk read from a stream, or its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Vec<u8>),
    Eof,
}

/// Multiplexed stdio for a single `exec`, plus a future resolving to the
/// process's exit code once it terminates.
pub struct ExecStreams {
    pub stdin: mpsc::Sender<Vec<u8>>,
    pub stdout: mpsc::Receiver<Result<Chunk, DriverError>>,
    pub stderr: mpsc::Receiver<Result<Chunk, DriverError>>,
    pub exit_code: oneshot::Receiver<i32>,
}

/// A live PTY. `resize` and `close` are fire-and-forget against the
/// underlying engine call; callers that need confirmation await the next
/// `read()` or the stream's EOF.
pub struct PtyHandle {
    pub input: mpsc::Sender<Vec<u8>>,
    pub output: mpsc::Receiver<Result<Chunk, DriverError>>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl PtyHandle {
    pub fn new(
        input: mpsc::Sender<Vec<u8>>,
        output: mpsc::Receiver<Result<Chunk, DriverError>>,
        resize_tx: mpsc::Sender<(u16, u16)>,
        close_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            input,
            output,
            resize_tx,
            close_tx: Some(close_tx),
        }
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), DriverError> {
        self.resize_tx
            .send((cols, rows))
            .await
            .map_err(|_| DriverError::EngineUnavailable("pty resize channel closed".to_string()))
    }

    /// A clone of the resize sender, for callers that keep the handle
    /// itself behind a registry and need to forward a resize from a
    /// different task than the one reading `output`.
    pub fn resize_tx(&self) -> mpsc::Sender<(u16, u16)> {
        self.resize_tx.clone()
    }

    /// Idempotent: a second call after the handle already closed is a no-op.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Detach the output receiver for an exclusive reader task, leaving a
    /// closed stand-in in its place so the handle as a whole can still be
    /// stored in a registry and closed later. Only the task that calls
    /// this should ever read PTY output; a second call yields a receiver
    /// that immediately reports EOF.
    pub fn take_output(&mut self) -> mpsc::Receiver<Result<Chunk, DriverError>> {
        let (_tx, rx) = mpsc::channel(1);
        std::mem::replace(&mut self.output, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pty_close_is_idempotent() {
        let (input_tx, _input_rx) = mpsc::channel(1);
        let (_output_tx, output_rx) = mpsc::channel(1);
        let (resize_tx, _resize_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();
        let mut pty = PtyHandle::new(input_tx, output_rx, resize_tx, close_tx);

        pty.close();
        pty.close();

        assert!(close_rx.await.is_ok());
    }
}
