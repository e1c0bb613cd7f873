// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team Pool: a shared balance drawn down by multiple members, each
//! capped per day and per month, with a threshold above which a single
//! debit requires out-of-band approval.

use crate::account::AccountId;
use crate::ids::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Identifies a team pool. Its shared balance lives on the
    /// `shared_account` it wraps.
    pub struct TeamPoolId;
}

/// Running consumption totals tracked per member, reset on the UTC day
/// boundary (daily) and on rollover (monthly).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberUsage {
    pub daily_consumed: Decimal,
    pub monthly_consumed: Decimal,
}

/// A shared balance for a group of members, with per-member caps and an
/// approval threshold above which a debit cannot proceed unattended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPool {
    pub id: TeamPoolId,
    pub shared_account: AccountId,
    pub members: Vec<UserId>,
    pub daily_cap_per_member: Decimal,
    pub monthly_cap_per_member: Decimal,
    pub approval_threshold: Decimal,
    pub member_usage: HashMap<UserId, MemberUsage>,
}

impl TeamPool {
    pub fn new(
        id: TeamPoolId,
        shared_account: AccountId,
        daily_cap_per_member: Decimal,
        monthly_cap_per_member: Decimal,
        approval_threshold: Decimal,
    ) -> Self {
        Self {
            id,
            shared_account,
            members: Vec::new(),
            daily_cap_per_member,
            monthly_cap_per_member,
            approval_threshold,
            member_usage: HashMap::new(),
        }
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    /// Whether `amount` would push the member's daily or monthly running
    /// total past its cap. Does not mutate; the caller applies the
    /// consumption separately once the debit itself succeeds.
    pub fn would_exceed_cap(&self, member: &UserId, amount: Decimal) -> bool {
        let usage = self.member_usage.get(member).copied().unwrap_or_default();
        usage.daily_consumed + amount > self.daily_cap_per_member
            || usage.monthly_consumed + amount > self.monthly_cap_per_member
    }

    /// Whether `amount` requires an Approval Request before it can be
    /// committed.
    pub fn requires_approval(&self, amount: Decimal) -> bool {
        amount > self.approval_threshold
    }

    /// Record `amount` against a member's running totals after a debit
    /// has been committed.
    pub fn record_consumption(&mut self, member: UserId, amount: Decimal) {
        let usage = self.member_usage.entry(member).or_default();
        usage.daily_consumed += amount;
        usage.monthly_consumed += amount;
    }

    /// Reset all members' daily totals, called at the UTC day boundary.
    pub fn reset_daily(&mut self) {
        for usage in self.member_usage.values_mut() {
            usage.daily_consumed = Decimal::ZERO;
        }
    }

    /// Reset all members' monthly totals, called on rollover.
    pub fn reset_monthly(&mut self) {
        for usage in self.member_usage.values_mut() {
            usage.monthly_consumed = Decimal::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pool() -> TeamPool {
        TeamPool::new(
            TeamPoolId::new("pool-1"),
            AccountId::new("acct-shared"),
            dec!(10),
            dec!(100),
            dec!(20),
        )
    }

    #[test]
    fn cap_check_considers_running_total() {
        let mut p = pool();
        let member = UserId::new("user-1");
        p.record_consumption(member.clone(), dec!(8));
        assert!(p.would_exceed_cap(&member, dec!(3)));
        assert!(!p.would_exceed_cap(&member, dec!(2)));
    }

    #[test]
    fn approval_threshold_is_exclusive_upper_bound() {
        let p = pool();
        assert!(!p.requires_approval(dec!(20)));
        assert!(p.requires_approval(dec!(20.01)));
    }

    #[test]
    fn daily_reset_clears_only_daily() {
        let mut p = pool();
        let member = UserId::new("user-1");
        p.record_consumption(member.clone(), dec!(5));
        p.reset_daily();
        let usage = p.member_usage.get(&member).unwrap();
        assert_eq!(usage.daily_consumed, Decimal::ZERO);
        assert_eq!(usage.monthly_consumed, dec!(5));
    }
}
