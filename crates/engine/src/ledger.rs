// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credits Ledger (§4.6): grant/consume/earn/gift/rollover on top of
//! per-account state, serialized per account, with cross-account gifts
//! locked in a stable id order to avoid deadlock. Every mutating
//! operation returns the `CreditTransaction` it appended alongside the
//! `Effect`s the caller (the daemon, which owns the Runtime Store) must
//! apply to make the change durable — the ledger itself never touches
//! disk.

use crate::error::EngineError;
use devbox_core::{
    AccountId, ApprovalRequest, ApprovalRequestId, ApprovalStatus, Clock, CreditTransaction,
    CreditsAccount, Effect, Event, IdGen, TeamPool, TeamPoolId, TransactionId, TransactionKind,
    UserId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Closed table of reasons an account can `earn` credits outside of a
/// grant, each with a fixed amount (§4.6: "amount determined from a
/// closed table of earning kinds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarningKind {
    ReferralBonus,
    OnboardingCompleted,
    FeedbackSubmitted,
}

impl EarningKind {
    pub fn amount(self) -> Decimal {
        use rust_decimal_macros::dec;
        match self {
            EarningKind::ReferralBonus => dec!(25),
            EarningKind::OnboardingCompleted => dec!(5),
            EarningKind::FeedbackSubmitted => dec!(2),
        }
    }

    fn description(self) -> &'static str {
        match self {
            EarningKind::ReferralBonus => "referral bonus",
            EarningKind::OnboardingCompleted => "onboarding completed",
            EarningKind::FeedbackSubmitted => "feedback submitted",
        }
    }
}

fn tx_effect(tx: &CreditTransaction) -> Effect {
    Effect::Emit {
        event: Event::LedgerTransaction {
            id: tx.id.clone(),
            account: tx.account_ref.clone(),
            amount: tx.amount,
            kind: tx.kind,
            reference: tx.reference.clone(),
        },
    }
}

/// The Credits Ledger. `C` drives transaction timestamps and rollover
/// bookkeeping; `G` mints transaction and approval-request ids.
pub struct Ledger<C: Clock, G: IdGen> {
    clock: C,
    ids: G,
    accounts: Mutex<HashMap<AccountId, Arc<Mutex<CreditsAccount>>>>,
    team_pools: Mutex<HashMap<TeamPoolId, Arc<Mutex<TeamPool>>>>,
    approvals: Mutex<HashMap<ApprovalRequestId, ApprovalRequest>>,
}

impl<C: Clock, G: IdGen> Ledger<C, G> {
    pub fn new(clock: C, ids: G) -> Self {
        Self {
            clock,
            ids,
            accounts: Mutex::new(HashMap::new()),
            team_pools: Mutex::new(HashMap::new()),
            approvals: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_account(&self, account: CreditsAccount) {
        self.accounts
            .lock()
            .insert(account.id.clone(), Arc::new(Mutex::new(account)));
    }

    pub fn register_team_pool(&self, pool: TeamPool) {
        self.team_pools.lock().insert(pool.id.clone(), Arc::new(Mutex::new(pool)));
    }

    pub fn balance(&self, account_id: &AccountId) -> Result<Decimal, EngineError> {
        Ok(self.account_entry(account_id)?.lock().balance)
    }

    fn account_entry(&self, account_id: &AccountId) -> Result<Arc<Mutex<CreditsAccount>>, EngineError> {
        self.accounts
            .lock()
            .get(account_id)
            .cloned()
            .ok_or_else(|| EngineError::AccountNotFound(account_id.clone()))
    }

    fn team_pool_entry(&self, pool_id: &TeamPoolId) -> Result<Arc<Mutex<TeamPool>>, EngineError> {
        self.team_pools
            .lock()
            .get(pool_id)
            .cloned()
            .ok_or_else(|| EngineError::TeamPoolNotFound(pool_id.clone()))
    }

    fn record(
        &self,
        account: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        description: impl Into<String>,
        reference: Option<String>,
    ) -> CreditTransaction {
        CreditTransaction::new(
            TransactionId::new(self.ids.next()),
            account,
            amount,
            kind,
            description,
            reference,
            self.clock.epoch_ms(),
        )
    }

    /// `grant(amount, reason)` — only positive.
    pub fn grant(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        reason: impl Into<String>,
    ) -> Result<(CreditTransaction, Vec<Effect>), EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount("grant amount must be positive".to_string()));
        }
        let entry = self.account_entry(account_id)?;
        let mut account = entry.lock();
        let tx = self.record(account_id.clone(), amount, TransactionKind::Grant, reason, None);
        account.apply(amount, TransactionKind::Grant);
        Ok((tx.clone(), vec![tx_effect(&tx)]))
    }

    /// `consume(amount, reason, reference)` — fails `insufficient_balance`
    /// if the post-balance would go negative.
    pub fn consume(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        reason: impl Into<String>,
        reference: Option<String>,
    ) -> Result<(CreditTransaction, Vec<Effect>), EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount("consume amount must be positive".to_string()));
        }
        let entry = self.account_entry(account_id)?;
        let mut account = entry.lock();
        if account.balance - amount < Decimal::ZERO {
            return Err(EngineError::InsufficientBalance {
                account: account_id.clone(),
                amount,
            });
        }
        let tx = self.record(account_id.clone(), -amount, TransactionKind::Usage, reason, reference);
        account.apply(-amount, TransactionKind::Usage);
        Ok((tx.clone(), vec![tx_effect(&tx)]))
    }

    /// `earn(kind, reference)` — amount from the closed `EarningKind` table.
    pub fn earn(
        &self,
        account_id: &AccountId,
        kind: EarningKind,
        reference: Option<String>,
    ) -> Result<(CreditTransaction, Vec<Effect>), EngineError> {
        let entry = self.account_entry(account_id)?;
        let mut account = entry.lock();
        let amount = kind.amount();
        let tx = self.record(
            account_id.clone(),
            amount,
            TransactionKind::Earning,
            kind.description(),
            reference,
        );
        account.apply(amount, TransactionKind::Earning);
        Ok((tx.clone(), vec![tx_effect(&tx)]))
    }

    /// `gift(from, to, amount, note)` — two coupled transactions committed
    /// together, all-or-nothing. Locks both accounts in a stable id order
    /// so concurrent gifts in opposite directions can never deadlock.
    pub fn gift(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<([CreditTransaction; 2], Vec<Effect>), EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount("gift amount must be positive".to_string()));
        }
        let note = note.into();
        let from_first = from.as_str() <= to.as_str();
        let (first_id, second_id) = if from_first { (from, to) } else { (to, from) };
        let first_entry = self.account_entry(first_id)?;
        let second_entry = self.account_entry(second_id)?;

        let mut first_guard = first_entry.lock();
        let mut second_guard = second_entry.lock();
        let (sender, recipient): (&mut CreditsAccount, &mut CreditsAccount) = if from_first {
            (&mut first_guard, &mut second_guard)
        } else {
            (&mut second_guard, &mut first_guard)
        };

        if sender.balance - amount < Decimal::ZERO {
            return Err(EngineError::InsufficientBalance {
                account: from.clone(),
                amount,
            });
        }

        let out_tx = self.record(
            from.clone(),
            -amount,
            TransactionKind::GiftOut,
            note.clone(),
            Some(to.to_string()),
        );
        let in_tx = self.record(to.clone(), amount, TransactionKind::GiftIn, note, Some(from.to_string()));
        sender.apply(-amount, TransactionKind::GiftOut);
        recipient.apply(amount, TransactionKind::GiftIn);

        let effects = vec![tx_effect(&out_tx), tx_effect(&in_tx)];
        Ok(([out_tx, in_tx], effects))
    }

    /// `monthly_rollover()` for a single account: rollover = min(balance,
    /// rollover_capacity), then balance += monthly_allocation; anything
    /// above rollover_capacity is forfeited. Emits one `rollover`
    /// transaction carrying the net balance delta, for auditability.
    pub fn monthly_rollover(
        &self,
        account_id: &AccountId,
    ) -> Result<(CreditTransaction, Vec<Effect>), EngineError> {
        let entry = self.account_entry(account_id)?;
        let mut account = entry.lock();
        let rollover_amount = account.balance.min(account.rollover_capacity);
        let new_balance = rollover_amount + account.monthly_allocation;
        let delta = new_balance - account.balance;
        let tx = self.record(
            account_id.clone(),
            delta,
            TransactionKind::Rollover,
            "monthly rollover",
            None,
        );
        account.apply(delta, TransactionKind::Rollover);
        account.last_rollover_at_ms = Some(self.clock.epoch_ms());
        Ok((tx.clone(), vec![tx_effect(&tx)]))
    }

    /// `predict_depletion(account, rate_per_hour) -> hours`.
    pub fn predict_depletion(&self, account_id: &AccountId, rate_per_hour: Decimal) -> Result<Option<Decimal>, EngineError> {
        if rate_per_hour <= Decimal::ZERO {
            return Ok(None);
        }
        let balance = self.balance(account_id)?;
        Ok(Some(balance / rate_per_hour))
    }

    /// Team-pool consumption: checks the member's daily/monthly running
    /// totals against caps before touching the shared balance; if the
    /// debit would still exceed `approval_threshold`, creates a pending
    /// Approval Request and returns `approval_required` without mutating
    /// anything.
    pub fn team_consume(
        &self,
        pool_id: &TeamPoolId,
        member: &UserId,
        amount: Decimal,
        reason: impl Into<String>,
    ) -> Result<(CreditTransaction, Vec<Effect>), EngineError> {
        let reason = reason.into();
        let pool_entry = self.team_pool_entry(pool_id)?;
        let shared_account = {
            let pool = pool_entry.lock();
            if pool.would_exceed_cap(member, amount) {
                return Err(EngineError::CapExceeded(pool_id.clone()));
            }
            if pool.requires_approval(amount) {
                let request = ApprovalRequest::new(
                    ApprovalRequestId::new(self.ids.next()),
                    pool.shared_account.clone(),
                    member.clone(),
                    amount,
                    reason,
                    self.clock.epoch_ms(),
                );
                let request_id = request.id.clone();
                self.approvals.lock().insert(request_id.clone(), request);
                return Err(EngineError::ApprovalRequired { request: request_id, amount });
            }
            pool.shared_account.clone()
        };

        let (tx, effects) = self.consume(&shared_account, amount, reason, Some(member.to_string()))?;
        pool_entry.lock().record_consumption(member.clone(), amount);
        Ok((tx, effects))
    }

    /// Resolve a pending approval request. Does not itself retry the
    /// debit that triggered it; the caller retries `team_consume` after
    /// a successful approval.
    pub fn resolve_approval(&self, request_id: &ApprovalRequestId, approved: bool) -> Result<(), EngineError> {
        let mut approvals = self.approvals.lock();
        let request = approvals
            .get_mut(request_id)
            .ok_or_else(|| EngineError::ApprovalRequestNotFound(request_id.clone()))?;
        request
            .resolve(approved, self.clock.epoch_ms())
            .map_err(|_| EngineError::ApprovalRequestNotFound(request_id.clone()))
    }

    pub fn pending_approvals(&self, account_id: &AccountId) -> Vec<ApprovalRequest> {
        self.approvals
            .lock()
            .values()
            .filter(|r| &r.account_ref == account_id && r.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }
}
