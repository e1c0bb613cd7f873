// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval Request: a pending out-of-band confirmation for a team-pool
//! debit that crossed the pool's approval threshold. The ledger never
//! blocks waiting on one — it fails the triggering debit with
//! `approval_required` and an external collaborator resolves the
//! request asynchronously.

use crate::account::AccountId;
use crate::ids::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a pending approval request.
    pub struct ApprovalRequestId;
}

/// Resolution state of an approval request. Once resolved, the request
/// is immutable; resolution does not retroactively commit the debit
/// that triggered it — the caller must retry after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// A pending confirmation for a debit above a team pool's approval
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub account_ref: AccountId,
    pub requester: UserId,
    pub amount: Decimal,
    pub description: String,
    pub status: ApprovalStatus,
    pub created_at_ms: u64,
    pub resolved_at_ms: Option<u64>,
}

impl ApprovalRequest {
    pub fn new(
        id: ApprovalRequestId,
        account_ref: AccountId,
        requester: UserId,
        amount: Decimal,
        description: impl Into<String>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            account_ref,
            requester,
            amount,
            description: description.into(),
            status: ApprovalStatus::Pending,
            created_at_ms,
            resolved_at_ms: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Resolve a pending request. Returns an error if already resolved,
    /// since a resolution is final.
    pub fn resolve(&mut self, approved: bool, at_ms: u64) -> Result<(), AlreadyResolved> {
        if !self.is_pending() {
            return Err(AlreadyResolved { request: self.id.clone() });
        }
        self.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Denied
        };
        self.resolved_at_ms = Some(at_ms);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("approval request {request} is already resolved")]
pub struct AlreadyResolved {
    pub request: ApprovalRequestId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(
            ApprovalRequestId::new("appr-1"),
            AccountId::new("acct-1"),
            UserId::new("user-1"),
            dec!(50),
            "large debit",
            1_000,
        )
    }

    #[test]
    fn resolve_is_final() {
        let mut req = request();
        req.resolve(true, 2_000).unwrap();
        assert_eq!(req.status, ApprovalStatus::Approved);
        assert!(req.resolve(false, 3_000).is_err());
    }
}
