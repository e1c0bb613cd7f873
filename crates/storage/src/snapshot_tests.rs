// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::MaterializedState;
use devbox_core::{EnvironmentClass, Event, ProjectId, SandboxId, SandboxState, SessionId, UserId};
use std::fs;
use std::io::Write;
use tempfile::tempdir;

fn sample_state() -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::SandboxCreated {
        id: SandboxId::new("sbx-1"),
        owner: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
    });
    state.apply_event(&Event::SandboxStateChanged {
        id: SandboxId::new("sbx-1"),
        from: SandboxState::Creating,
        to: SandboxState::Running,
    });
    state.apply_event(&Event::SessionStarted {
        id: SessionId::new("sess-1"),
        user: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
        sandbox: SandboxId::new("sbx-1"),
        environment_class: EnvironmentClass::Production,
    });
    state
}

#[test]
fn snapshot_save_and_load_round_trips_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let snapshot = Snapshot::new(42, sample_state());
    snapshot.save(&path).unwrap();
    assert!(path.exists());

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.state.sandboxes["sbx-1"].state, SandboxState::Running);
    assert!(loaded.state.sessions.contains_key("sess-1"));
}

#[test]
fn load_missing_snapshot_returns_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nonexistent.json");

    assert!(Snapshot::load(&path).unwrap().is_none());
}

#[test]
fn save_is_atomic_no_tmp_file_left_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let tmp_path = path.with_extension("tmp");

    Snapshot::new(1, sample_state()).save(&path).unwrap();

    assert!(!tmp_path.exists());
    assert!(path.exists());
}

#[test]
fn corrupt_snapshot_loads_as_none_and_is_moved_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut f = fs::File::create(&path).unwrap();
    f.write_all(b"\xe5\x03\x01not-json").unwrap();
    drop(f);

    assert!(Snapshot::load(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn corrupt_snapshot_rotates_bak_files_keeping_at_most_three() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    for i in 1..=4u8 {
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(&[i; 4]).unwrap();
        drop(f);
        assert!(Snapshot::load(&path).unwrap().is_none());
    }

    assert_eq!(fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 4]);
    assert_eq!(fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 4]);
    assert_eq!(fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 4]);
    assert!(!path.with_extension("bak.4").exists());
}
