//! Append-only event store boundary.
//!
//! One stream per ledger. Events are only ever appended; there is no update
//! or delete path.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
