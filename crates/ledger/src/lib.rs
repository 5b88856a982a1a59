//! Tip-jar ledger module (event-sourced).
//!
//! Pure domain logic only: no IO, no persistence, no fund movement. The
//! external transfer of a withdrawal is performed by the service layer
//! between `StartWithdrawal` and `CompleteWithdrawal`/`RevertWithdrawal`.

pub mod access;
pub mod ledger;
pub mod memo;
pub mod payment;
pub mod policy;
pub mod withdrawal;

pub use access::AccessControl;
pub use ledger::{
    AddressUpdated, BuyCoffee, CompleteWithdrawal, Initialize, LedgerCommand, LedgerEvent,
    LedgerId, LedgerInitialized, NewMemo, RevertWithdrawal, StartWithdrawal, TipJar,
    UpdateWithdrawalAddress, WithdrawalCompleted, WithdrawalReverted, WithdrawalStarted,
};
pub use memo::{Memo, MemoLog};
pub use policy::LedgerPolicy;
pub use withdrawal::{EmptyWithdrawal, PendingWithdrawal};
