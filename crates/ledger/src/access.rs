use tipjar_auth::{AccessPolicy, Permission, Principal};
use tipjar_core::{DomainResult, Identity};

/// Owner identity (fixed) plus the current withdrawal destination.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccessControl {
    owner: Identity,
    withdrawal_address: Identity,
}

impl AccessControl {
    /// One-time construction: the owner is also the first withdrawal destination.
    pub fn initialize(owner: Identity) -> Self {
        Self {
            owner,
            withdrawal_address: owner,
        }
    }

    pub fn owner(&self) -> Identity {
        self.owner
    }

    pub fn withdrawal_address(&self) -> Identity {
        self.withdrawal_address
    }

    /// Resolve `caller` against the owner and check it may perform `permission`.
    pub fn authorize(
        &self,
        policy: &AccessPolicy,
        caller: Identity,
        permission: Permission,
    ) -> DomainResult<Principal> {
        let principal = Principal::resolve(caller, self.owner);
        policy.check(&principal, permission)?;
        Ok(principal)
    }

    pub(crate) fn set_withdrawal_address(&mut self, address: Identity) {
        self.withdrawal_address = address;
    }
}
