//! Infrastructure layer: event store, command dispatch, the serialized
//! ledger service, withdrawal transfers, and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod ledger_service;
pub mod transfer;
pub mod withdrawal;

#[cfg(test)]
mod testing;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::{ConfigError, LedgerConfig};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use ledger_service::{LEDGER_AGGREGATE_TYPE, LedgerService, LedgerServiceError, LedgerServiceResult};
pub use transfer::{InMemoryBank, Transfer, TransferError};
pub use withdrawal::WithdrawalService;
