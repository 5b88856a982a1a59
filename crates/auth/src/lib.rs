//! `tipjar-auth`: caller capability checks for the ledger.
//!
//! Callers arrive pre-authenticated; this crate only decides what an identity
//! may do given the ledger's owner and the configured policy.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AccessPolicy, AuthzError, WithdrawAccess, authorize};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
