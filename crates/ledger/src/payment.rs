//! Payment gateway: validates a tip and records it as one memo + one credit.

use tipjar_auth::Permission;
use tipjar_core::{Amount, DomainError};

use crate::ledger::{BuyCoffee, LedgerEvent, NewMemo, TipJar};

impl TipJar {
    /// Decide a `BuyCoffee` command.
    ///
    /// A single `NewMemo` event carries both the memo and the credited amount,
    /// so the log append and the balance increase commit together.
    pub(crate) fn handle_buy_coffee(&self, cmd: &BuyCoffee) -> Result<Vec<LedgerEvent>, DomainError> {
        let access = self.active()?;
        self.ensure_ledger_id(cmd.ledger_id)?;
        access.authorize(&self.policy.access, cmd.sender, Permission::BuyCoffee)?;

        let amount = Amount::from_payment(cmd.amount)?;

        // Balance plus an in-flight withdrawal must stay representable, so a
        // reversal can always put the withdrawn amount back.
        let in_flight = self.pending.map(|p| p.amount).unwrap_or(Amount::ZERO);
        self.balance
            .checked_add(in_flight)
            .and_then(|held| held.checked_add(amount))
            .ok_or_else(|| DomainError::invariant("balance overflow"))?;

        Ok(vec![LedgerEvent::NewMemo(NewMemo {
            ledger_id: cmd.ledger_id,
            memo_index: self.memos.next_index(),
            sender: cmd.sender,
            amount,
            name: cmd.name.clone(),
            message: cmd.message.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
