//! Event store for the food cart write model.
//!
//! Events are grouped into per-aggregate streams ordered by [`Version`].
//! Appends are atomic and guarded by an expected version, which is how the
//! write side detects concurrent modification of the same aggregate.

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
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
