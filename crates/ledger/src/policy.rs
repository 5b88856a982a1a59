use serde::{Deserialize, Serialize};

use tipjar_auth::{AccessPolicy, WithdrawAccess};

use crate::withdrawal::EmptyWithdrawal;

/// Per-ledger decision policy, handed to the aggregate at construction.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub access: AccessPolicy,
    pub empty_withdrawal: EmptyWithdrawal,
}

impl LedgerPolicy {
    pub fn new(withdraw_access: WithdrawAccess, empty_withdrawal: EmptyWithdrawal) -> Self {
        Self {
            access: AccessPolicy::new(withdraw_access),
            empty_withdrawal,
        }
    }
}
