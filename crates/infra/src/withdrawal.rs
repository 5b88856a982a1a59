//! `withdrawTips`: move the whole balance to the withdrawal address.
//!
//! Effects before interaction:
//!
//! 1. under the gate, commit `WithdrawalStarted` (balance is now zero and the
//!    withdrawal is marked pending)
//! 2. release the gate and run the external transfer
//! 3. under the gate again, commit `WithdrawalCompleted` on success or
//!    `WithdrawalReverted` (balance restored) on failure
//!
//! Any call the destination makes back into the ledger during step 2 sees the
//! zeroed balance and the pending marker, so it cannot pay out twice.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};
use uuid::Uuid;

use tipjar_core::{DomainError, Identity};
use tipjar_events::{EventBus, EventEnvelope};
use tipjar_ledger::{
    CompleteWithdrawal, LedgerCommand, LedgerEvent, LedgerId, RevertWithdrawal, StartWithdrawal,
    WithdrawalCompleted, WithdrawalStarted,
};

use crate::event_store::EventStore;
use crate::ledger_service::{LedgerService, LedgerServiceResult, single};
use crate::transfer::Transfer;

impl<S, B> LedgerService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Withdraw the full balance of `ledger_id` through `transfer`.
    ///
    /// Returns `Ok(None)` when the balance is zero and the ledger is configured
    /// to treat that as a no-op. A failed transfer is reported as
    /// `DomainError::TransferFailure` after the balance has been restored.
    pub fn withdraw_tips(
        &self,
        ledger_id: LedgerId,
        caller: Identity,
        transfer: &dyn Transfer,
    ) -> LedgerServiceResult<Option<WithdrawalCompleted>> {
        let Some(started) = self.start_withdrawal(ledger_id, caller)? else {
            info!(ledger_id = %ledger_id, caller = %caller, "nothing to withdraw");
            return Ok(None);
        };

        match transfer.transfer(started.destination, started.amount) {
            Ok(()) => self.complete_withdrawal(&started).map(Some),
            Err(err) => {
                warn!(
                    ledger_id = %ledger_id,
                    withdrawal_id = %started.withdrawal_id,
                    destination = %started.destination,
                    amount = %started.amount,
                    error = %err,
                    "transfer failed; reverting withdrawal"
                );
                self.revert_withdrawal(&started, err.to_string())?;
                Err(DomainError::transfer(err.to_string()).into())
            }
        }
    }

    fn start_withdrawal(
        &self,
        ledger_id: LedgerId,
        caller: Identity,
    ) -> LedgerServiceResult<Option<WithdrawalStarted>> {
        let _gate = self.lock()?;
        let result = self.dispatch(
            ledger_id,
            LedgerCommand::StartWithdrawal(StartWithdrawal {
                ledger_id,
                caller,
                withdrawal_id: Uuid::now_v7(),
                occurred_at: Utc::now(),
            }),
        );

        let out = match result {
            Ok(out) => out,
            Err(err) => {
                warn!(ledger_id = %ledger_id, caller = %caller, error = %err, "withdrawal rejected");
                return Err(err.into());
            }
        };
        if out.events.is_empty() {
            return Ok(None);
        }

        let started = single(out, |e| match e {
            LedgerEvent::WithdrawalStarted(e) => Some(e),
            _ => None,
        })?;
        info!(
            ledger_id = %ledger_id,
            withdrawal_id = %started.withdrawal_id,
            destination = %started.destination,
            amount = %started.amount,
            "withdrawal started"
        );
        Ok(Some(started))
    }

    fn complete_withdrawal(&self, started: &WithdrawalStarted) -> LedgerServiceResult<WithdrawalCompleted> {
        let _gate = self.lock()?;
        let result = self.dispatch(
            started.ledger_id,
            LedgerCommand::CompleteWithdrawal(CompleteWithdrawal {
                ledger_id: started.ledger_id,
                withdrawal_id: started.withdrawal_id,
                occurred_at: Utc::now(),
            }),
        );

        let out = match result {
            Ok(out) => out,
            Err(err) => {
                error!(
                    ledger_id = %started.ledger_id,
                    withdrawal_id = %started.withdrawal_id,
                    error = %err,
                    "funds transferred but completion could not be recorded"
                );
                return Err(err.into());
            }
        };

        let completed = single(out, |e| match e {
            LedgerEvent::WithdrawalCompleted(e) => Some(e),
            _ => None,
        })?;
        info!(
            ledger_id = %completed.ledger_id,
            withdrawal_id = %completed.withdrawal_id,
            destination = %completed.destination,
            amount = %completed.amount,
            "withdrawal completed"
        );
        Ok(completed)
    }

    fn revert_withdrawal(&self, started: &WithdrawalStarted, reason: String) -> LedgerServiceResult<()> {
        let _gate = self.lock()?;
        let result = self.dispatch(
            started.ledger_id,
            LedgerCommand::RevertWithdrawal(RevertWithdrawal {
                ledger_id: started.ledger_id,
                withdrawal_id: started.withdrawal_id,
                reason,
                occurred_at: Utc::now(),
            }),
        );

        if let Err(err) = result {
            error!(
                ledger_id = %started.ledger_id,
                withdrawal_id = %started.withdrawal_id,
                error = %err,
                "transfer failed and the balance could not be restored"
            );
            return Err(err.into());
        }
        Ok(())
    }
}

/// Withdrawal front end bound to one transfer rail.
#[derive(Debug)]
pub struct WithdrawalService<S, B, T> {
    ledger: Arc<LedgerService<S, B>>,
    transfer: T,
}

impl<S, B, T> WithdrawalService<S, B, T>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    T: Transfer,
{
    pub fn new(ledger: Arc<LedgerService<S, B>>, transfer: T) -> Self {
        Self { ledger, transfer }
    }

    pub fn ledger(&self) -> &Arc<LedgerService<S, B>> {
        &self.ledger
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn withdraw(
        &self,
        ledger_id: LedgerId,
        caller: Identity,
    ) -> LedgerServiceResult<Option<WithdrawalCompleted>> {
        self.ledger.withdraw_tips(ledger_id, caller, &self.transfer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tipjar_auth::WithdrawAccess;
    use tipjar_core::Amount;
    use tipjar_events::InMemoryEventBus;
    use tipjar_ledger::{EmptyWithdrawal, LedgerPolicy};

    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::ledger_service::LedgerServiceError;
    use crate::testing::FailingBus;
    use crate::transfer::{InMemoryBank, TransferError};

    type Service = LedgerService<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn service(policy: LedgerPolicy) -> Arc<Service> {
        Arc::new(LedgerService::new(
            InMemoryEventStore::new(),
            Arc::new(InMemoryEventBus::new()),
            policy,
        ))
    }

    fn domain_err<T: core::fmt::Debug>(result: LedgerServiceResult<T>) -> DomainError {
        match result.unwrap_err() {
            LedgerServiceError::Domain(e) => e,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    fn tip_three(service: &Service, ledger_id: LedgerId) {
        for (name, n) in [("Carolina", 1), ("Tom", 2), ("Steve", 3)] {
            service
                .buy_coffee(ledger_id, Identity::new(), 1, name, format!("Good stuff! {n}"))
                .unwrap();
        }
    }

    #[test]
    fn withdraw_pays_destination_and_zeroes_balance() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        tip_three(&service, ledger_id);
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(3));

        let bank = InMemoryBank::new();
        let completed = service
            .withdraw_tips(ledger_id, Identity::new(), &bank)
            .unwrap()
            .unwrap();

        assert_eq!(completed.amount, Amount::new(3));
        assert_eq!(completed.destination, owner);
        assert_eq!(bank.balance_of(owner), Amount::new(3));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::ZERO);
        assert_eq!(service.memo_count(ledger_id).unwrap(), 3);
        assert!(service.snapshot(ledger_id).unwrap().pending_withdrawal().is_none());
    }

    #[test]
    fn withdraw_follows_updated_address() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        let target = Identity::new();
        service.update_withdrawal_address(ledger_id, owner, target).unwrap();
        service.buy_coffee(ledger_id, Identity::new(), 9, "", "").unwrap();

        let withdrawals = WithdrawalService::new(service.clone(), InMemoryBank::new());
        withdrawals.withdraw(ledger_id, owner).unwrap();

        assert_eq!(withdrawals.transfer().balance_of(target), Amount::new(9));
        assert_eq!(withdrawals.transfer().balance_of(owner), Amount::ZERO);
    }

    #[test]
    fn empty_withdrawal_is_rejected_by_default() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        let bank = InMemoryBank::new();

        let err = domain_err(service.withdraw_tips(ledger_id, owner, &bank));

        assert_eq!(err, DomainError::NothingToWithdraw);
        assert_eq!(bank.balance_of(owner), Amount::ZERO);
        // Only the initialization event is on the stream.
        assert_eq!(service.store().load_stream(ledger_id.0).unwrap().len(), 1);
    }

    #[test]
    fn empty_withdrawal_can_be_a_no_op() {
        let service = service(LedgerPolicy::new(WithdrawAccess::Anyone, EmptyWithdrawal::NoOp));
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        let sub = service.subscribe();

        let out = service.withdraw_tips(ledger_id, owner, &InMemoryBank::new()).unwrap();

        assert!(out.is_none());
        assert!(sub.drain().is_empty());
        assert_eq!(service.store().load_stream(ledger_id.0).unwrap().len(), 1);
    }

    #[test]
    fn rejected_transfer_restores_balance() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        tip_three(&service, ledger_id);
        let bank = InMemoryBank::new();
        bank.reject(owner);
        let sub = service.subscribe();

        let err = domain_err(service.withdraw_tips(ledger_id, owner, &bank));

        assert!(matches!(err, DomainError::TransferFailure(_)));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(3));
        assert_eq!(service.memo_count(ledger_id).unwrap(), 3);
        assert_eq!(bank.balance_of(owner), Amount::ZERO);
        assert!(service.snapshot(ledger_id).unwrap().pending_withdrawal().is_none());

        let types: Vec<String> = sub.drain().iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(
            types,
            vec!["tipjar.ledger.withdrawal_started", "tipjar.ledger.withdrawal_reverted"]
        );

        // Once the destination accepts again the same funds go out.
        bank.accept(owner);
        service.withdraw_tips(ledger_id, owner, &bank).unwrap();
        assert_eq!(bank.balance_of(owner), Amount::new(3));
    }

    #[test]
    fn owner_only_policy_rejects_other_callers() {
        let service = service(LedgerPolicy::new(WithdrawAccess::OwnerOnly, EmptyWithdrawal::Reject));
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        tip_three(&service, ledger_id);
        let bank = InMemoryBank::new();

        let err = domain_err(service.withdraw_tips(ledger_id, Identity::new(), &bank));
        assert_eq!(err, DomainError::Unauthorized);
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(3));

        service.withdraw_tips(ledger_id, owner, &bank).unwrap();
        assert_eq!(bank.balance_of(owner), Amount::new(3));
    }

    /// Destination that calls back into the ledger while being paid.
    struct Reentrant<'a> {
        service: &'a Service,
        bank: &'a InMemoryBank,
        ledger_id: LedgerId,
        identity: Identity,
        tip_first: Option<i128>,
        entered: AtomicBool,
        inner: Mutex<Option<LedgerServiceResult<Option<WithdrawalCompleted>>>>,
    }

    impl<'a> Reentrant<'a> {
        fn new(service: &'a Service, bank: &'a InMemoryBank, ledger_id: LedgerId, identity: Identity) -> Self {
            Self {
                service,
                bank,
                ledger_id,
                identity,
                tip_first: None,
                entered: AtomicBool::new(false),
                inner: Mutex::new(None),
            }
        }

        fn inner_result(&self) -> Option<LedgerServiceResult<Option<WithdrawalCompleted>>> {
            self.inner.lock().unwrap().take()
        }
    }

    impl Transfer for Reentrant<'_> {
        fn transfer(&self, destination: Identity, amount: Amount) -> Result<(), TransferError> {
            if !self.entered.swap(true, Ordering::SeqCst) {
                if let Some(tip) = self.tip_first {
                    self.service
                        .buy_coffee(self.ledger_id, self.identity, tip, "again", "")
                        .map_err(|e| TransferError::Failed(e.to_string()))?;
                }
                let inner = self.service.withdraw_tips(self.ledger_id, self.identity, self);
                *self.inner.lock().unwrap() = Some(inner);
            }
            self.bank.transfer(destination, amount)
        }
    }

    #[test]
    fn reentrant_withdrawal_sees_zero_balance_and_is_paid_once() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        let attacker = Identity::new();
        service.update_withdrawal_address(ledger_id, owner, attacker).unwrap();
        tip_three(&service, ledger_id);
        let bank = InMemoryBank::new();
        let destination = Reentrant::new(&service, &bank, ledger_id, attacker);

        let completed = service
            .withdraw_tips(ledger_id, attacker, &destination)
            .unwrap()
            .unwrap();

        assert_eq!(completed.amount, Amount::new(3));
        assert_eq!(
            domain_err(destination.inner_result().unwrap()),
            DomainError::NothingToWithdraw
        );
        assert_eq!(bank.balance_of(attacker), Amount::new(3));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::ZERO);
    }

    #[test]
    fn reentrant_withdrawal_with_new_tips_is_guarded() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        tip_three(&service, ledger_id);
        let bank = InMemoryBank::new();
        let mut destination = Reentrant::new(&service, &bank, ledger_id, owner);
        destination.tip_first = Some(5);

        service.withdraw_tips(ledger_id, owner, &destination).unwrap();

        assert_eq!(
            domain_err(destination.inner_result().unwrap()),
            DomainError::WithdrawalInProgress
        );
        assert_eq!(bank.balance_of(owner), Amount::new(3));
        // The tip that landed during the transfer stays on the ledger.
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(5));
        assert_eq!(service.memo_count(ledger_id).unwrap(), 4);
    }

    #[test]
    fn revert_after_concurrent_tip_keeps_both_amounts() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        tip_three(&service, ledger_id);
        let bank = InMemoryBank::new();
        bank.reject(owner);
        let mut destination = Reentrant::new(&service, &bank, ledger_id, owner);
        destination.tip_first = Some(2);

        let err = domain_err(service.withdraw_tips(ledger_id, owner, &destination));

        assert!(matches!(err, DomainError::TransferFailure(_)));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(5));
        assert_eq!(service.memo_count(ledger_id).unwrap(), 4);
    }

    #[test]
    fn history_replays_to_the_same_state() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        tip_three(&service, ledger_id);
        service.withdraw_tips(ledger_id, owner, &InMemoryBank::new()).unwrap();
        service.buy_coffee(ledger_id, Identity::new(), 4, "late", "").unwrap();

        let replayed: Service = LedgerService::new(
            InMemoryEventStore::new(),
            Arc::new(InMemoryEventBus::new()),
            LedgerPolicy::default(),
        );
        let stream = service.store().load_stream(ledger_id.0).unwrap();
        let uncommitted = stream
            .iter()
            .map(|e| crate::event_store::UncommittedEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type.clone(),
                event_type: e.event_type.clone(),
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload.clone(),
            })
            .collect();
        replayed
            .store()
            .append(uncommitted, tipjar_core::ExpectedVersion::Exact(0))
            .unwrap();

        assert_eq!(replayed.snapshot(ledger_id).unwrap(), service.snapshot(ledger_id).unwrap());
        assert_eq!(replayed.balance_of(ledger_id).unwrap(), Amount::new(4));
        assert_eq!(replayed.memo_count(ledger_id).unwrap(), 4);
    }

    #[test]
    fn balance_beyond_u64_is_withdrawn_in_full() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        let coffee: i128 = 1_000_000_000_000_000_000;
        for _ in 0..20 {
            service.buy_coffee(ledger_id, Identity::new(), coffee, "", "").unwrap();
        }
        let total = Amount::new(20 * coffee as u128);
        assert!(total.value() > u128::from(u64::MAX));
        assert_eq!(service.balance_of(ledger_id).unwrap(), total);

        let bank = InMemoryBank::new();
        let completed = service.withdraw_tips(ledger_id, owner, &bank).unwrap().unwrap();

        assert_eq!(completed.amount, total);
        assert_eq!(bank.balance_of(owner), total);
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::ZERO);
    }

    #[test]
    fn single_tip_beyond_u64_is_accepted_and_withdrawn() {
        let service = service(LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        let big = i128::from(u64::MAX) + 1;

        let memo = service.buy_coffee(ledger_id, Identity::new(), big, "whale", "").unwrap();
        assert_eq!(memo.amount, Amount::new(big as u128));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(big as u128));

        let bank = InMemoryBank::new();
        service.withdraw_tips(ledger_id, owner, &bank).unwrap();
        assert_eq!(bank.balance_of(owner), Amount::new(big as u128));
    }

    #[test]
    fn unpublished_start_still_transfers_and_completes() {
        let bus = Arc::new(FailingBus::failing_on(&["tipjar.ledger.withdrawal_started"]));
        let service = LedgerService::new(InMemoryEventStore::new(), bus, LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        for _ in 0..3 {
            service.buy_coffee(ledger_id, Identity::new(), 1, "", "").unwrap();
        }
        let bank = InMemoryBank::new();

        let completed = service.withdraw_tips(ledger_id, owner, &bank).unwrap().unwrap();

        assert_eq!(completed.amount, Amount::new(3));
        assert_eq!(bank.balance_of(owner), Amount::new(3));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::ZERO);
        assert!(service.snapshot(ledger_id).unwrap().pending_withdrawal().is_none());

        service.buy_coffee(ledger_id, Identity::new(), 2, "", "").unwrap();
        service.withdraw_tips(ledger_id, owner, &bank).unwrap();
        assert_eq!(bank.balance_of(owner), Amount::new(5));
    }

    #[test]
    fn unpublished_start_still_reverts_a_rejected_transfer() {
        let bus = Arc::new(FailingBus::failing_on(&["tipjar.ledger.withdrawal_started"]));
        let service = LedgerService::new(InMemoryEventStore::new(), bus, LedgerPolicy::default());
        let owner = Identity::new();
        let ledger_id = service.initialize(owner).unwrap();
        service.buy_coffee(ledger_id, Identity::new(), 3, "", "").unwrap();
        let bank = InMemoryBank::new();
        bank.reject(owner);

        let err = domain_err(service.withdraw_tips(ledger_id, owner, &bank));

        assert!(matches!(err, DomainError::TransferFailure(_)));
        assert_eq!(service.balance_of(ledger_id).unwrap(), Amount::new(3));
        assert!(service.snapshot(ledger_id).unwrap().pending_withdrawal().is_none());
    }
}
