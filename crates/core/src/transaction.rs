// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credit transactions: the append-only record the ledger replays into a
//! materialized balance. A transaction is written exactly once and never
//! mutated; corrections are new transactions, never edits.

use crate::account::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies one credit transaction. Immutable once written.
    pub struct TransactionId;
}

/// The closed set of reasons a transaction was written. The sign of the
/// amount is independent of kind (a `gift_out` carries a negative
/// amount, `gift_in` a positive one) so `balance = sum(amount)` holds
/// regardless of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Grant,
    Usage,
    Earning,
    GiftOut,
    GiftIn,
    Rollover,
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub account_ref: AccountId,
    /// Signed amount: positive credits the account, negative debits it.
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    /// An opaque reference to the entity that caused this transaction,
    /// e.g. a session id for `usage`, a counterpart account id for gifts.
    pub reference: Option<String>,
    pub created_at_ms: u64,
}

impl CreditTransaction {
    pub fn new(
        id: TransactionId,
        account_ref: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        description: impl Into<String>,
        reference: Option<String>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            account_ref,
            amount,
            kind,
            description: description.into(),
            reference,
            created_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transaction_carries_signed_amount() {
        let tx = CreditTransaction::new(
            TransactionId::new("tx-1"),
            AccountId::new("acct-1"),
            dec!(-2.5),
            TransactionKind::Usage,
            "sandbox usage",
            Some("sess-1".to_string()),
            1_000,
        );
        assert!(tx.amount.is_sign_negative());
    }
}
