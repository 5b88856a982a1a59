//! Withdrawal decisions.
//!
//! A withdrawal is two commits around one external transfer:
//!
//! ```text
//! StartWithdrawal    -> WithdrawalStarted   (balance = 0, pending = Some)
//!   ... transfer to destination (service layer, no lock held) ...
//! CompleteWithdrawal -> WithdrawalCompleted (pending = None)
//! RevertWithdrawal   -> WithdrawalReverted  (balance += amount, pending = None)
//! ```
//!
//! Anything that calls back into the ledger during the transfer sees the
//! zeroed balance and the pending marker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tipjar_auth::Permission;
use tipjar_core::{Amount, DomainError, Identity};

use crate::ledger::{
    CompleteWithdrawal, LedgerEvent, RevertWithdrawal, StartWithdrawal, TipJar, WithdrawalCompleted,
    WithdrawalReverted, WithdrawalStarted,
};

/// What `withdrawTips` does when the balance is zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyWithdrawal {
    /// Fail with `NothingToWithdraw`.
    #[default]
    Reject,
    /// Succeed without transferring or recording anything.
    NoOp,
}

/// A withdrawal whose balance has been zeroed but whose transfer has not settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingWithdrawal {
    pub withdrawal_id: Uuid,
    pub destination: Identity,
    pub amount: Amount,
}

impl TipJar {
    pub(crate) fn handle_start_withdrawal(
        &self,
        cmd: &StartWithdrawal,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        let access = self.active()?;
        self.ensure_ledger_id(cmd.ledger_id)?;
        access.authorize(&self.policy.access, cmd.caller, Permission::WithdrawTips)?;

        if self.balance.is_zero() {
            return match self.policy.empty_withdrawal {
                EmptyWithdrawal::Reject => Err(DomainError::NothingToWithdraw),
                EmptyWithdrawal::NoOp => Ok(vec![]),
            };
        }
        if self.pending.is_some() {
            return Err(DomainError::WithdrawalInProgress);
        }

        Ok(vec![LedgerEvent::WithdrawalStarted(WithdrawalStarted {
            ledger_id: cmd.ledger_id,
            withdrawal_id: cmd.withdrawal_id,
            caller: cmd.caller,
            destination: access.withdrawal_address(),
            amount: self.balance,
            occurred_at: cmd.occurred_at,
        })])
    }

    pub(crate) fn handle_complete_withdrawal(
        &self,
        cmd: &CompleteWithdrawal,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.active()?;
        self.ensure_ledger_id(cmd.ledger_id)?;
        let pending = self.ensure_pending(cmd.withdrawal_id)?;

        Ok(vec![LedgerEvent::WithdrawalCompleted(WithdrawalCompleted {
            ledger_id: cmd.ledger_id,
            withdrawal_id: pending.withdrawal_id,
            destination: pending.destination,
            amount: pending.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    pub(crate) fn handle_revert_withdrawal(
        &self,
        cmd: &RevertWithdrawal,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.active()?;
        self.ensure_ledger_id(cmd.ledger_id)?;
        let pending = self.ensure_pending(cmd.withdrawal_id)?;

        Ok(vec![LedgerEvent::WithdrawalReverted(WithdrawalReverted {
            ledger_id: cmd.ledger_id,
            withdrawal_id: pending.withdrawal_id,
            destination: pending.destination,
            amount: pending.amount,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn ensure_pending(&self, withdrawal_id: Uuid) -> Result<PendingWithdrawal, DomainError> {
        match self.pending {
            Some(p) if p.withdrawal_id == withdrawal_id => Ok(p),
            Some(p) => Err(DomainError::invariant(format!(
                "withdrawal {withdrawal_id} is not pending (pending: {})",
                p.withdrawal_id
            ))),
            None => Err(DomainError::invariant(format!(
                "withdrawal {withdrawal_id} is not pending"
            ))),
        }
    }
}
