// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mount validation and environment sanitization (§4.1). Both live above
//! the [`crate::SandboxDriver`] trait: every implementation calls through
//! these same helpers from its own `create`, so the policy is enforced
//! once rather than re-derived per engine.

use crate::error::DriverError;
use crate::spec::Mount;
use std::path::{Component, Path, PathBuf};

/// Names stripped outright, and suffixes whose presence strips a variable
/// regardless of exact name (§4.1: "a suffix matching the 'secret'
/// pattern").
#[derive(Debug, Clone)]
pub struct MountPolicy {
    pub allowed_source_prefixes: Vec<String>,
    pub blocked_target_prefixes: Vec<String>,
    pub denied_env_names: Vec<String>,
    pub denied_env_suffixes: Vec<String>,
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            allowed_source_prefixes: vec!["/workspaces".to_string(), "/tmp/devbox".to_string()],
            blocked_target_prefixes: vec![
                "/proc".to_string(),
                "/sys".to_string(),
                "/var/run/docker.sock".to_string(),
            ],
            denied_env_names: vec![
                "AWS_SECRET_ACCESS_KEY".to_string(),
                "AWS_SESSION_TOKEN".to_string(),
                "DEVBOX_ADMIN_TOKEN".to_string(),
                "DATABASE_URL".to_string(),
            ],
            denied_env_suffixes: vec!["_SECRET".to_string(), "_TOKEN".to_string(), "_KEY".to_string()],
        }
    }
}

/// Lexically resolve `.`/`..` components without touching the filesystem
/// (mount sources and archive paths routinely name sandboxes that don't
/// exist on the host yet, so `fs::canonicalize` isn't an option). Mirrors
/// the effect of the original's `Path(...).resolve()` for a path that
/// need not exist: a `..` pops the last normal component instead of being
/// compared as a literal path segment.
fn normalize_lexical(path: &str) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::ParentDir => {
                if !matches!(normalized.components().next_back(), Some(Component::RootDir) | None) {
                    normalized.pop();
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Component-wise prefix check after lexical normalization, so a sibling
/// directory name sharing a string prefix (`/workspaces-evil`) or a `..`
/// escape (`/workspaces/../etc/passwd`) can't pass as "under" `prefix`.
fn is_under(path: &str, prefix: &str) -> bool {
    normalize_lexical(path).starts_with(normalize_lexical(prefix))
}

/// Reject a mount whose source escapes the allowed prefixes or whose
/// target falls under a blocked one. Source paths MUST "resolve" under
/// an allowed prefix (§4.1); target paths are checked the same way so a
/// `..` can't bypass the blocked-target list either.
pub fn validate_mount(mount: &Mount, policy: &MountPolicy) -> Result<(), DriverError> {
    let source_ok = policy
        .allowed_source_prefixes
        .iter()
        .any(|prefix| is_under(&mount.source, prefix));
    if !source_ok {
        return Err(DriverError::InvalidPath(mount.source.clone()));
    }

    let target_blocked = policy
        .blocked_target_prefixes
        .iter()
        .any(|prefix| is_under(&mount.target, prefix));
    if target_blocked {
        return Err(DriverError::InvalidPath(mount.target.clone()));
    }

    Ok(())
}

/// Validate an archive transfer path the same way a mount target is
/// validated (§7: `invalid_path` covers "mount or archive target").
pub fn validate_archive_path(path: &str, policy: &MountPolicy) -> Result<(), DriverError> {
    let blocked = policy
        .blocked_target_prefixes
        .iter()
        .any(|prefix| is_under(path, prefix));
    if blocked {
        return Err(DriverError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Strip credential-bearing variables before the environment reaches the
/// engine. Case-insensitive on the suffix match since engines are
/// typically case-sensitive about the whole name but users are not
/// consistent about casing conventions.
pub fn sanitize_env(env: Vec<(String, String)>, policy: &MountPolicy) -> Vec<(String, String)> {
    env.into_iter()
        .filter(|(name, _)| {
            let upper = name.to_ascii_uppercase();
            if policy.denied_env_names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                return false;
            }
            !policy
                .denied_env_suffixes
                .iter()
                .any(|suffix| upper.ends_with(suffix.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(source: &str, target: &str) -> Mount {
        Mount {
            source: source.to_string(),
            target: target.to_string(),
            readonly: false,
        }
    }

    #[test]
    fn allows_mount_under_configured_prefix() {
        let policy = MountPolicy::default();
        assert!(validate_mount(&mount("/workspaces/proj-1", "/home/user"), &policy).is_ok());
    }

    #[test]
    fn rejects_source_outside_allowed_prefixes() {
        let policy = MountPolicy::default();
        let err = validate_mount(&mount("/etc", "/home/user"), &policy).unwrap_err();
        assert!(matches!(err, DriverError::InvalidPath(_)));
    }

    #[test]
    fn rejects_sibling_directory_sharing_a_string_prefix() {
        let policy = MountPolicy::default();
        let err = validate_mount(&mount("/workspaces-evil/x", "/home/user"), &policy).unwrap_err();
        assert!(matches!(err, DriverError::InvalidPath(_)));
    }

    #[test]
    fn rejects_dot_dot_traversal_out_of_an_allowed_prefix() {
        let policy = MountPolicy::default();
        let err =
            validate_mount(&mount("/workspaces/../etc/passwd", "/home/user"), &policy).unwrap_err();
        assert!(matches!(err, DriverError::InvalidPath(_)));
    }

    #[test]
    fn rejects_dot_dot_traversal_into_a_blocked_target() {
        let policy = MountPolicy::default();
        let err =
            validate_mount(&mount("/workspaces/proj-1", "/workspaces/../proc/1"), &policy)
                .unwrap_err();
        assert!(matches!(err, DriverError::InvalidPath(_)));
    }

    #[test]
    fn rejects_blocked_target() {
        let policy = MountPolicy::default();
        let err =
            validate_mount(&mount("/workspaces/proj-1", "/var/run/docker.sock"), &policy)
                .unwrap_err();
        assert!(matches!(err, DriverError::InvalidPath(_)));
    }

    #[test]
    fn sanitize_env_strips_denied_names_and_suffixes() {
        let policy = MountPolicy::default();
        let env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), "shh".to_string()),
            ("STRIPE_API_SECRET".to_string(), "shh".to_string()),
            ("GITHUB_TOKEN".to_string(), "shh".to_string()),
            ("EDITOR".to_string(), "vim".to_string()),
        ];
        let cleaned = sanitize_env(env, &policy);
        let names: Vec<&str> = cleaned.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["PATH", "EDITOR"]);
    }

    #[test]
    fn validate_archive_path_rejects_blocked_prefix() {
        let policy = MountPolicy::default();
        assert!(validate_archive_path("/proc/1/mem", &policy).is_err());
        assert!(validate_archive_path("/home/user/file.txt", &policy).is_ok());
    }
}
