//! Serialized entry point to tip-jar ledgers.
//!
//! Every operation runs as one critical section (load, decide, append,
//! publish) behind a single gate, which gives a total order over calls. The
//! only place the gate is released mid-operation is the external transfer of
//! a withdrawal (see [`crate::withdrawal`]).

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use tipjar_core::{AggregateId, Amount, DomainError, Identity};
use tipjar_events::{EventBus, EventEnvelope, Subscription};
use tipjar_ledger::{
    AddressUpdated, BuyCoffee, Initialize, LedgerCommand, LedgerEvent, LedgerId, LedgerInitialized,
    LedgerPolicy, Memo, NewMemo, TipJar, UpdateWithdrawalAddress,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::config::LedgerConfig;
use crate::event_store::EventStore;

/// Aggregate type recorded on every ledger stream.
pub const LEDGER_AGGREGATE_TYPE: &str = "tipjar.ledger";

#[derive(Debug, Error)]
pub enum LedgerServiceError {
    /// Business rejection; the ledger is unchanged.
    #[error(transparent)]
    Domain(DomainError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("ledger gate poisoned")]
    Poisoned,
}

impl LedgerServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            LedgerServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DomainError> for LedgerServiceError {
    fn from(value: DomainError) -> Self {
        LedgerServiceError::Domain(value)
    }
}

impl From<DispatchError> for LedgerServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => LedgerServiceError::Domain(e),
            other => LedgerServiceError::Dispatch(other),
        }
    }
}

pub type LedgerServiceResult<T> = Result<T, LedgerServiceError>;

#[derive(Debug)]
pub struct LedgerService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    policy: LedgerPolicy,
    gate: Mutex<()>,
}

impl<S, B> LedgerService<S, B> {
    pub fn new(store: S, bus: B, policy: LedgerPolicy) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            policy,
            gate: Mutex::new(()),
        }
    }

    pub fn from_config(store: S, bus: B, config: &LedgerConfig) -> Self {
        Self::new(store, bus, config.policy())
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub(crate) fn lock(&self) -> LedgerServiceResult<MutexGuard<'_, ()>> {
        self.gate.lock().map_err(|_| LedgerServiceError::Poisoned)
    }
}

impl<S, B> LedgerService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Subscribe to every ledger event committed after this call.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    /// Create a new ledger owned by `owner`.
    pub fn initialize(&self, owner: Identity) -> LedgerServiceResult<LedgerId> {
        let ledger_id = LedgerId::new(AggregateId::new());
        self.initialize_ledger(ledger_id, owner)?;
        Ok(ledger_id)
    }

    /// Initialize the ledger stored under `ledger_id`. Fails with
    /// `AlreadyInitialized` if it already has an owner.
    pub fn initialize_ledger(
        &self,
        ledger_id: LedgerId,
        owner: Identity,
    ) -> LedgerServiceResult<LedgerInitialized> {
        let _gate = self.lock()?;
        let out = self.dispatch(
            ledger_id,
            LedgerCommand::Initialize(Initialize {
                ledger_id,
                owner,
                occurred_at: Utc::now(),
            }),
        )?;

        let initialized = single(out, |e| match e {
            LedgerEvent::LedgerInitialized(e) => Some(e),
            _ => None,
        })?;
        info!(ledger_id = %ledger_id, owner = %owner, "ledger initialized");
        Ok(initialized)
    }

    /// `buyCoffee`: record a tip of `amount` from `sender`.
    pub fn buy_coffee(
        &self,
        ledger_id: LedgerId,
        sender: Identity,
        amount: i128,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> LedgerServiceResult<NewMemo> {
        let _gate = self.lock()?;
        let result = self.dispatch(
            ledger_id,
            LedgerCommand::BuyCoffee(BuyCoffee {
                ledger_id,
                sender,
                amount,
                name: name.into(),
                message: message.into(),
                occurred_at: Utc::now(),
            }),
        );

        let out = match result {
            Ok(out) => out,
            Err(err) => {
                warn!(ledger_id = %ledger_id, sender = %sender, amount = %amount, error = %err, "payment rejected");
                return Err(err.into());
            }
        };

        let memo = single(out, |e| match e {
            LedgerEvent::NewMemo(e) => Some(e),
            _ => None,
        })?;
        info!(
            ledger_id = %ledger_id,
            sender = %sender,
            amount = %memo.amount,
            memo_index = memo.memo_index,
            "tip received"
        );
        Ok(memo)
    }

    /// Owner-only change of the withdrawal destination.
    pub fn update_withdrawal_address(
        &self,
        ledger_id: LedgerId,
        caller: Identity,
        new_address: Identity,
    ) -> LedgerServiceResult<AddressUpdated> {
        let _gate = self.lock()?;
        let result = self.dispatch(
            ledger_id,
            LedgerCommand::UpdateWithdrawalAddress(UpdateWithdrawalAddress {
                ledger_id,
                caller,
                new_address,
                occurred_at: Utc::now(),
            }),
        );

        let out = match result {
            Ok(out) => out,
            Err(err) => {
                warn!(ledger_id = %ledger_id, caller = %caller, error = %err, "address update rejected");
                return Err(err.into());
            }
        };

        let updated = single(out, |e| match e {
            LedgerEvent::AddressUpdated(e) => Some(e),
            _ => None,
        })?;
        info!(
            ledger_id = %ledger_id,
            previous = %updated.previous,
            new_address = %updated.new_address,
            "withdrawal address updated"
        );
        Ok(updated)
    }

    /// Current ledger state, rebuilt from its stream.
    ///
    /// Unlike the other queries this also returns uninitialized ledgers.
    pub fn snapshot(&self, ledger_id: LedgerId) -> LedgerServiceResult<TipJar> {
        let _gate = self.lock()?;
        self.load(ledger_id)
    }

    /// `balanceOf`.
    pub fn balance_of(&self, ledger_id: LedgerId) -> LedgerServiceResult<Amount> {
        Ok(self.active(ledger_id)?.balance())
    }

    /// `getMemos`: every memo in call order, detached from later appends.
    pub fn get_memos(&self, ledger_id: LedgerId) -> LedgerServiceResult<Vec<Memo>> {
        Ok(self.active(ledger_id)?.memos().snapshot())
    }

    pub fn memo_count(&self, ledger_id: LedgerId) -> LedgerServiceResult<usize> {
        Ok(self.active(ledger_id)?.memos().len())
    }

    pub fn owner(&self, ledger_id: LedgerId) -> LedgerServiceResult<Identity> {
        self.active(ledger_id)?
            .owner()
            .ok_or(LedgerServiceError::Domain(DomainError::NotInitialized))
    }

    pub fn withdrawal_address(&self, ledger_id: LedgerId) -> LedgerServiceResult<Identity> {
        self.active(ledger_id)?
            .withdrawal_address()
            .ok_or(LedgerServiceError::Domain(DomainError::NotInitialized))
    }

    fn active(&self, ledger_id: LedgerId) -> LedgerServiceResult<TipJar> {
        let jar = self.snapshot(ledger_id)?;
        if !jar.is_initialized() {
            return Err(DomainError::NotInitialized.into());
        }
        Ok(jar)
    }

    /// Load without taking the gate. Callers must already hold it.
    pub(crate) fn load(&self, ledger_id: LedgerId) -> LedgerServiceResult<TipJar> {
        let policy = self.policy;
        Ok(self
            .dispatcher
            .load(ledger_id.0, |id| TipJar::empty(LedgerId::new(id), policy))?)
    }

    /// Dispatch without taking the gate. Callers must already hold it.
    pub(crate) fn dispatch(
        &self,
        ledger_id: LedgerId,
        command: LedgerCommand,
    ) -> Result<Dispatched<TipJar>, DispatchError> {
        let policy = self.policy;
        self.dispatcher.dispatch(ledger_id.0, LEDGER_AGGREGATE_TYPE, command, |id| {
            TipJar::empty(LedgerId::new(id), policy)
        })
    }
}

/// Pick the one event of the expected kind out of a dispatch result.
pub(crate) fn single<T>(
    out: Dispatched<TipJar>,
    pick: impl Fn(LedgerEvent) -> Option<T>,
) -> LedgerServiceResult<T> {
    out.events
        .into_iter()
        .find_map(pick)
        .ok_or_else(|| DomainError::invariant("command produced no matching event").into())
}
