//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic rejection: the operation that produced it
/// committed nothing. Storage and transport failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Payment attempted with a non-positive amount.
    #[error("invalid amount: payments must be greater than zero (got {0})")]
    InvalidAmount(i128),

    /// Privileged operation invoked by a caller without the required role.
    #[error("unauthorized")]
    Unauthorized,

    /// The external transfer of a withdrawal could not complete.
    #[error("transfer failed: {0}")]
    TransferFailure(String),

    /// Withdrawal attempted while the balance is zero.
    #[error("nothing to withdraw")]
    NothingToWithdraw,

    /// A withdrawal is already waiting on its transfer.
    #[error("withdrawal already in progress")]
    WithdrawalInProgress,

    /// The ledger has not been initialized yet.
    #[error("ledger not initialized")]
    NotInitialized,

    /// `initialize` called on an already active ledger.
    #[error("ledger already initialized")]
    AlreadyInitialized,

    /// A domain invariant would be violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::TransferFailure(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
