// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::format_time_ago;

#[test]
fn format_time_ago_zero_is_dash() {
    assert_eq!(format_time_ago(0), "-");
}

#[test]
fn format_time_ago_seconds() {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let ts = now_ms - 5_000;
    assert_eq!(format_time_ago(ts), "5s");
}

#[test]
fn format_time_ago_minutes() {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let ts = now_ms - 120_000;
    assert_eq!(format_time_ago(ts), "2m");
}

#[test]
fn format_time_ago_hours() {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let ts = now_ms - 3 * 3_600_000;
    assert_eq!(format_time_ago(ts), "3h");
}

#[test]
fn format_time_ago_days() {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let ts = now_ms - 2 * 86_400_000;
    assert_eq!(format_time_ago(ts), "2d");
}
