use tipjar_core::Identity;

use crate::Role;

/// A caller resolved against one ledger's owner.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: Identity,
    pub role: Role,
}

impl Principal {
    /// Resolve the caller's role: the ledger owner is `Owner`, everyone else `Any`.
    pub fn resolve(identity: Identity, owner: Identity) -> Self {
        let role = if identity == owner { Role::Owner } else { Role::Any };
        Self { identity, role }
    }
}
