// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use devbox_core::{ConnectionId, ProjectId, SandboxId, UserId};
use std::io::Write;
use tempfile::tempdir;

fn connection_opened(id: &str) -> Event {
    Event::ConnectionOpened {
        id: ConnectionId::new(id),
        user: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
    }
}

fn sandbox_gone(id: &str) -> Event {
    Event::SandboxGone { id: SandboxId::new(id) }
}

#[test]
fn append_then_flush_makes_entries_durable_and_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");
    let mut wal = Wal::open(&path, 0).unwrap();

    let seq = wal.append(&connection_opened("conn-1")).unwrap();
    assert_eq!(seq, 1);
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 1);
    assert_eq!(entry.event, connection_opened("conn-1"));
}

#[test]
fn needs_flush_is_false_for_an_empty_buffer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");
    let wal = Wal::open(&path, 0).unwrap();
    assert!(!wal.needs_flush());
}

#[test]
fn reopening_resumes_write_sequence_after_processed_seq() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&connection_opened("conn-1")).unwrap();
        wal.append(&sandbox_gone("sbx-1")).unwrap();
        wal.flush().unwrap();
        wal.mark_processed(1);
    }

    let mut wal = Wal::open(&path, 1).unwrap();
    assert_eq!(wal.write_seq(), 2);
    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 2);
}

#[test]
fn truncate_before_drops_processed_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");
    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&connection_opened("conn-1")).unwrap();
    wal.append(&connection_opened("conn-2")).unwrap();
    wal.append(&connection_opened("conn-3")).unwrap();
    wal.flush().unwrap();
    wal.mark_processed(2);

    wal.truncate_before(3).unwrap();

    let remaining = wal.entries_after(0).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].seq, 3);
}

#[test]
fn entries_after_returns_only_newer_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");
    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&connection_opened("conn-1")).unwrap();
    wal.append(&connection_opened("conn-2")).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq, 2);
}

#[test]
fn corrupt_tail_is_rotated_to_bak_and_clean_entries_survive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&connection_opened("conn-1")).unwrap();
        wal.flush().unwrap();
    }

    // Append a malformed trailing line directly, simulating a crash mid-write.
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{not valid json\n").unwrap();
    }

    let mut wal = Wal::open(&path, 0).unwrap();
    assert!(path.with_extension("bak").exists());
    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 1);
    assert!(wal.next_unprocessed().unwrap().is_none());
}
