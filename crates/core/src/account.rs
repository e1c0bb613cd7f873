// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Credits Account: a tenant's balance and lifetime counters. The
//! account itself only tracks state; the debit/credit/gift/rollover
//! operations that mutate it under the ledger's invariants live in the
//! engine crate, which is the only writer.

use crate::ids::UserId;
use crate::team_pool::TeamPoolId;
use crate::transaction::TransactionKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a credits account. One account per user.
    pub struct AccountId;
}

/// A tenant's credits balance and lifetime counters. `balance` is the
/// single source of truth at read time but is defined to equal the sum
/// of all committed transactions for the account; the engine's ledger
/// is responsible for keeping the two in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditsAccount {
    pub id: AccountId,
    pub owner: UserId,
    pub balance: Decimal,
    pub lifetime_earned: Decimal,
    pub lifetime_spent: Decimal,
    pub gifted_sent: Decimal,
    pub gifted_received: Decimal,
    pub monthly_allocation: Decimal,
    pub rollover_capacity: Decimal,
    pub last_rollover_at_ms: Option<u64>,
    pub team_pool_ref: Option<TeamPoolId>,
}

impl CreditsAccount {
    pub fn new(id: AccountId, owner: UserId, monthly_allocation: Decimal, rollover_capacity: Decimal) -> Self {
        Self {
            id,
            owner,
            balance: Decimal::ZERO,
            lifetime_earned: Decimal::ZERO,
            lifetime_spent: Decimal::ZERO,
            gifted_sent: Decimal::ZERO,
            gifted_received: Decimal::ZERO,
            monthly_allocation,
            rollover_capacity,
            last_rollover_at_ms: None,
            team_pool_ref: None,
        }
    }

    /// Apply a transaction's effect to the cached counters. Does not
    /// itself enforce `balance >= 0`; the caller (the engine's ledger)
    /// is responsible for rejecting a transaction that would violate the
    /// invariant before ever constructing and applying it.
    pub fn apply(&mut self, amount: Decimal, kind: TransactionKind) {
        self.balance += amount;
        match kind {
            TransactionKind::Grant | TransactionKind::Rollover => {
                self.lifetime_earned += amount;
            }
            TransactionKind::Earning => {
                self.lifetime_earned += amount;
            }
            TransactionKind::Usage => {
                self.lifetime_spent += -amount;
            }
            TransactionKind::GiftOut => {
                self.gifted_sent += -amount;
            }
            TransactionKind::GiftIn => {
                self.gifted_received += amount;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> CreditsAccount {
        CreditsAccount::new(
            AccountId::new("acct-1"),
            UserId::new("user-1"),
            dec!(100),
            dec!(50),
        )
    }

    #[test]
    fn usage_debit_tracks_lifetime_spent() {
        let mut acct = account();
        acct.apply(dec!(10), TransactionKind::Grant);
        acct.apply(dec!(-3), TransactionKind::Usage);
        assert_eq!(acct.balance, dec!(7));
        assert_eq!(acct.lifetime_spent, dec!(3));
    }

    #[test]
    fn gift_out_and_gift_in_track_separately() {
        let mut sender = account();
        sender.apply(dec!(20), TransactionKind::Grant);
        sender.apply(dec!(-5), TransactionKind::GiftOut);
        assert_eq!(sender.gifted_sent, dec!(5));

        let mut recipient = account();
        recipient.apply(dec!(5), TransactionKind::GiftIn);
        assert_eq!(recipient.gifted_received, dec!(5));
    }
}
