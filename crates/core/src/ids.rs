// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small cross-cutting identifier newtypes that don't warrant their own module.

crate::define_id! {
    /// Identifies an authenticated end user. The core treats this as an opaque
    /// reference; authentication itself is delegated to an external collaborator.
    pub struct UserId;
}

crate::define_id! {
    /// Identifies a project. Sessions, sandboxes, and collaboration rooms are
    /// all scoped by project.
    pub struct ProjectId;
}

crate::define_id! {
    /// Identifies a PTY opened inside a sandbox on behalf of an IDE connection.
    pub struct PtyId;
}

/// Alias used on the wire protocol, where PTYs are addressed as "terminals".
pub type TerminalId = PtyId;

crate::define_id! {
    /// Identifies a file watch subscription registered by an IDE connection.
    pub struct WatcherId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_id_is_pty_id() {
        let id = TerminalId::new("term-1");
        let pty: PtyId = id;
        assert_eq!(pty.as_str(), "term-1");
    }
}
