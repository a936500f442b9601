//! Append-only event store boundary.
//!
//! This module defines an infrastructure-facing abstraction for storing and
//! loading company-scoped event streams without making any storage
//! assumptions. Only the in-memory implementation ships here; a durable
//! backend is an external collaborator behind the same trait.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
