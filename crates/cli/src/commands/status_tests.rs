// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::format_uptime;

#[test]
fn format_uptime_seconds_only() {
    assert_eq!(format_uptime(45), "45s");
}

#[test]
fn format_uptime_minutes() {
    assert_eq!(format_uptime(125), "2m 5s");
}

#[test]
fn format_uptime_hours() {
    assert_eq!(format_uptime(3725), "1h 2m 5s");
}
