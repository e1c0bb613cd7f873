// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token verification: the external collaborator the multiplexer's
//! `auth` message delegates to. OAuth/password authentication itself is
//! out of scope here — this is only the narrow seam between a bearer
//! token on the wire and the `UserId` it names, so the daemon can be
//! pointed at whatever identity provider a deployment actually uses.

use async_trait::async_trait;
use devbox_core::UserId;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Development/test verifier: the token *is* the user id, rejecting only
/// the empty string. A real deployment swaps this for a verifier that
/// calls out to the actual identity provider; nothing else in the
/// multiplexer needs to change.
pub struct StaticTokenVerifier;

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(UserId::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let verifier = StaticTokenVerifier;
        assert!(verifier.verify("").await.is_err());
    }

    #[tokio::test]
    async fn non_empty_token_resolves_to_a_user() {
        let verifier = StaticTokenVerifier;
        let user = verifier.verify("user-42").await.unwrap();
        assert_eq!(user, UserId::new("user-42"));
    }
}
