//! Append-only event store.
//!
//! Every saga instance, saga step and identity entity is persisted as a
//! stream of [`EventEnvelope`]s keyed by its [`AggregateId`]. Appends are
//! guarded by optimistic concurrency on the stream [`Version`].

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt};
