use serde::{Deserialize, Serialize};
use thiserror::Error;

use tipjar_core::DomainError;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: '{permission}' requires role '{required}'")]
    Forbidden {
        permission: Permission,
        required: Role,
    },
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        DomainError::Unauthorized
    }
}

/// Who may trigger a withdrawal.
///
/// Withdrawal always pays the configured destination, never the caller.
/// `Anyone` is the default.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawAccess {
    #[default]
    Anyone,
    OwnerOnly,
}

/// Maps each permission to the role it requires.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub withdraw_access: WithdrawAccess,
}

impl AccessPolicy {
    pub fn new(withdraw_access: WithdrawAccess) -> Self {
        Self { withdraw_access }
    }

    pub fn required_role(&self, permission: Permission) -> Role {
        match permission {
            Permission::BuyCoffee => Role::Any,
            Permission::UpdateWithdrawalAddress => Role::Owner,
            Permission::WithdrawTips => match self.withdraw_access {
                WithdrawAccess::Anyone => Role::Any,
                WithdrawAccess::OwnerOnly => Role::Owner,
            },
        }
    }

    /// Capability check for `principal` under this policy.
    pub fn check(&self, principal: &Principal, permission: Permission) -> Result<(), AuthzError> {
        authorize(principal, permission, self.required_role(permission))
    }
}

/// Authorize a principal for a permission requiring `required`.
///
/// - No IO
/// - No panics
/// - No business logic (pure role comparison)
pub fn authorize(principal: &Principal, permission: Permission, required: Role) -> Result<(), AuthzError> {
    if principal.role.satisfies(required) {
        Ok(())
    } else {
        tracing::debug!(
            caller = %principal.identity,
            %permission,
            %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden { permission, required })
    }
}
