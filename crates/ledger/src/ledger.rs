use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tipjar_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, Identity};
use tipjar_events::Event;

use crate::access::AccessControl;
use crate::memo::{Memo, MemoLog};
use crate::policy::LedgerPolicy;
use crate::withdrawal::PendingWithdrawal;

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: TipJar.
///
/// Holds the whole ledger: access control, balance, memo log, and the
/// withdrawal currently waiting on its external transfer (if any).
/// `access == None` means the ledger is still uninitialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipJar {
    pub(crate) id: LedgerId,
    pub(crate) policy: LedgerPolicy,
    pub(crate) access: Option<AccessControl>,
    pub(crate) balance: Amount,
    pub(crate) memos: MemoLog,
    pub(crate) pending: Option<PendingWithdrawal>,
    version: u64,
}

impl TipJar {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId, policy: LedgerPolicy) -> Self {
        Self {
            id,
            policy,
            access: None,
            balance: Amount::ZERO,
            memos: MemoLog::new(),
            pending: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    pub fn is_initialized(&self) -> bool {
        self.access.is_some()
    }

    pub fn owner(&self) -> Option<Identity> {
        self.access.map(|a| a.owner())
    }

    pub fn withdrawal_address(&self) -> Option<Identity> {
        self.access.map(|a| a.withdrawal_address())
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn memos(&self) -> &MemoLog {
        &self.memos
    }

    pub fn pending_withdrawal(&self) -> Option<&PendingWithdrawal> {
        self.pending.as_ref()
    }

    pub(crate) fn active(&self) -> Result<&AccessControl, DomainError> {
        self.access.as_ref().ok_or(DomainError::NotInitialized)
    }

    pub(crate) fn ensure_ledger_id(&self, ledger_id: LedgerId) -> Result<(), DomainError> {
        if self.id != ledger_id {
            return Err(DomainError::invariant("ledger_id mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for TipJar {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Initialize (deployment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initialize {
    pub ledger_id: LedgerId,
    pub owner: Identity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BuyCoffee (a tip with attached value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyCoffee {
    pub ledger_id: LedgerId,
    pub sender: Identity,
    /// Attached value as sent; anything `<= 0` is rejected.
    pub amount: i128,
    pub name: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateWithdrawalAddress (owner only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWithdrawalAddress {
    pub ledger_id: LedgerId,
    pub caller: Identity,
    pub new_address: Identity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartWithdrawal (phase one of `withdrawTips`, before the transfer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartWithdrawal {
    pub ledger_id: LedgerId,
    pub caller: Identity,
    pub withdrawal_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteWithdrawal (the transfer reached the destination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteWithdrawal {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevertWithdrawal (the destination rejected the funds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertWithdrawal {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Initialize(Initialize),
    BuyCoffee(BuyCoffee),
    UpdateWithdrawalAddress(UpdateWithdrawalAddress),
    StartWithdrawal(StartWithdrawal),
    CompleteWithdrawal(CompleteWithdrawal),
    RevertWithdrawal(RevertWithdrawal),
}

/// Event: LedgerInitialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInitialized {
    pub ledger_id: LedgerId,
    pub owner: Identity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NewMemo. `occurred_at` doubles as the memo timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMemo {
    pub ledger_id: LedgerId,
    pub memo_index: u64,
    pub sender: Identity,
    pub amount: Amount,
    pub name: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewMemo {
    pub fn memo(&self) -> Memo {
        Memo {
            sender: self.sender,
            timestamp: self.occurred_at,
            name: self.name.clone(),
            message: self.message.clone(),
        }
    }
}

/// Event: AddressUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressUpdated {
    pub ledger_id: LedgerId,
    pub previous: Identity,
    pub new_address: Identity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalStarted. Balance is zero from this point on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalStarted {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub caller: Identity,
    pub destination: Identity,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalCompleted {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub destination: Identity,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalReverted. The withdrawn amount goes back onto the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReverted {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub destination: Identity,
    pub amount: Amount,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    LedgerInitialized(LedgerInitialized),
    NewMemo(NewMemo),
    AddressUpdated(AddressUpdated),
    WithdrawalStarted(WithdrawalStarted),
    WithdrawalCompleted(WithdrawalCompleted),
    WithdrawalReverted(WithdrawalReverted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerInitialized(_) => "tipjar.ledger.initialized",
            LedgerEvent::NewMemo(_) => "tipjar.ledger.new_memo",
            LedgerEvent::AddressUpdated(_) => "tipjar.ledger.address_updated",
            LedgerEvent::WithdrawalStarted(_) => "tipjar.ledger.withdrawal_started",
            LedgerEvent::WithdrawalCompleted(_) => "tipjar.ledger.withdrawal_completed",
            LedgerEvent::WithdrawalReverted(_) => "tipjar.ledger.withdrawal_reverted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::LedgerInitialized(e) => e.occurred_at,
            LedgerEvent::NewMemo(e) => e.occurred_at,
            LedgerEvent::AddressUpdated(e) => e.occurred_at,
            LedgerEvent::WithdrawalStarted(e) => e.occurred_at,
            LedgerEvent::WithdrawalCompleted(e) => e.occurred_at,
            LedgerEvent::WithdrawalReverted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TipJar {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::LedgerInitialized(e) => {
                self.id = e.ledger_id;
                self.access = Some(AccessControl::initialize(e.owner));
            }
            LedgerEvent::NewMemo(e) => {
                self.memos.append(e.memo());
                self.credit(e.amount);
            }
            LedgerEvent::AddressUpdated(e) => {
                if let Some(access) = self.access.as_mut() {
                    access.set_withdrawal_address(e.new_address);
                }
            }
            LedgerEvent::WithdrawalStarted(e) => {
                self.balance = Amount::ZERO;
                self.pending = Some(PendingWithdrawal {
                    withdrawal_id: e.withdrawal_id,
                    destination: e.destination,
                    amount: e.amount,
                });
            }
            LedgerEvent::WithdrawalCompleted(_) => {
                self.pending = None;
            }
            LedgerEvent::WithdrawalReverted(e) => {
                self.credit(e.amount);
                self.pending = None;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Initialize(cmd) => self.handle_initialize(cmd),
            LedgerCommand::BuyCoffee(cmd) => self.handle_buy_coffee(cmd),
            LedgerCommand::UpdateWithdrawalAddress(cmd) => self.handle_update_address(cmd),
            LedgerCommand::StartWithdrawal(cmd) => self.handle_start_withdrawal(cmd),
            LedgerCommand::CompleteWithdrawal(cmd) => self.handle_complete_withdrawal(cmd),
            LedgerCommand::RevertWithdrawal(cmd) => self.handle_revert_withdrawal(cmd),
        }
    }
}

impl TipJar {
    /// `handle` rules out overflow before any crediting event is decided; an
    /// event that would still overflow leaves the balance untouched.
    fn credit(&mut self, amount: Amount) {
        if let Some(balance) = self.balance.checked_add(amount) {
            self.balance = balance;
        }
    }

    fn handle_initialize(&self, cmd: &Initialize) -> Result<Vec<LedgerEvent>, DomainError> {
        if self.is_initialized() {
            return Err(DomainError::AlreadyInitialized);
        }
        self.ensure_ledger_id(cmd.ledger_id)?;

        Ok(vec![LedgerEvent::LedgerInitialized(LedgerInitialized {
            ledger_id: cmd.ledger_id,
            owner: cmd.owner,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_address(
        &self,
        cmd: &UpdateWithdrawalAddress,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        let access = self.active()?;
        self.ensure_ledger_id(cmd.ledger_id)?;
        access.authorize(
            &self.policy.access,
            cmd.caller,
            tipjar_auth::Permission::UpdateWithdrawalAddress,
        )?;

        Ok(vec![LedgerEvent::AddressUpdated(AddressUpdated {
            ledger_id: cmd.ledger_id,
            previous: access.withdrawal_address(),
            new_address: cmd.new_address,
            occurred_at: cmd.occurred_at,
        })])
    }
}
