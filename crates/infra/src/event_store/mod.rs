//! Append-only event store boundary.
//!
//! Streams are keyed by organization + aggregate. The store is the source of
//! truth: the bus and every read model are derived from it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
