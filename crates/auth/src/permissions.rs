use serde::{Deserialize, Serialize};

/// Ledger operations subject to a capability check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    BuyCoffee,
    UpdateWithdrawalAddress,
    WithdrawTips,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::BuyCoffee => "ledger.buy_coffee",
            Permission::UpdateWithdrawalAddress => "ledger.update_withdrawal_address",
            Permission::WithdrawTips => "ledger.withdraw_tips",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
