//! External fund transfer boundary.
//!
//! A withdrawal moves value out of the ledger through a [`Transfer`]. The
//! receiving side may run arbitrary logic on receipt, including calling back
//! into the ledger service, so implementations are always invoked with no
//! ledger lock held.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use tipjar_core::{Amount, Identity};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The destination refused to accept the funds.
    #[error("destination {0} rejected the transfer")]
    Rejected(Identity),

    #[error("transfer failed: {0}")]
    Failed(String),
}

/// Moves `amount` to `destination`. Succeeds only if the funds arrived.
pub trait Transfer: Send + Sync {
    fn transfer(&self, destination: Identity, amount: Amount) -> Result<(), TransferError>;
}

impl<T> Transfer for Arc<T>
where
    T: Transfer + ?Sized,
{
    fn transfer(&self, destination: Identity, amount: Amount) -> Result<(), TransferError> {
        (**self).transfer(destination, amount)
    }
}

impl<T> Transfer for &T
where
    T: Transfer + ?Sized,
{
    fn transfer(&self, destination: Identity, amount: Amount) -> Result<(), TransferError> {
        (**self).transfer(destination, amount)
    }
}

/// In-memory accounts outside the ledger.
///
/// Records what each identity has been paid. Destinations can be switched
/// to rejecting mode to exercise the rollback path.
#[derive(Debug, Default)]
pub struct InMemoryBank {
    accounts: RwLock<HashMap<Identity, Amount>>,
    rejecting: RwLock<HashSet<Identity>>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later transfer to `destination` fail.
    pub fn reject(&self, destination: Identity) {
        self.rejecting
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(destination);
    }

    pub fn accept(&self, destination: Identity) {
        self.rejecting
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&destination);
    }

    pub fn balance_of(&self, identity: Identity) -> Amount {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&identity)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn is_rejecting(&self, destination: Identity) -> bool {
        self.rejecting
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&destination)
    }
}

impl Transfer for InMemoryBank {
    fn transfer(&self, destination: Identity, amount: Amount) -> Result<(), TransferError> {
        if self.is_rejecting(destination) {
            return Err(TransferError::Rejected(destination));
        }

        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| TransferError::Failed("bank accounts lock poisoned".to_string()))?;
        let account = accounts.entry(destination).or_insert(Amount::ZERO);
        *account = account
            .checked_add(amount)
            .ok_or_else(|| TransferError::Failed(format!("account {destination} would overflow")))?;

        Ok(())
    }
}
