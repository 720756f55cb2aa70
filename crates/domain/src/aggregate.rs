//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

use crate::command::Command;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is stored next to the payload and used for filtering.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// Current state is never stored. It is rebuilt by folding [`apply`](Self::apply)
/// over the aggregate's event stream, starting from [`Default`].
///
/// - [`handle`](Self::handle) decides which events a command produces
/// - [`apply`](Self::apply) evolves state by one event
///
/// Both are pure and deterministic: no I/O, no clock, no randomness.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of commands this aggregate accepts.
    type Command: Command;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identity, or None before its creation event.
    fn id(&self) -> Option<&AggregateId>;

    /// Returns the number of events applied so far.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Decides the events a command produces against the current state.
    ///
    /// Returns an empty list for commands accepted as no-ops.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Events produced by [`handle`](Self::handle) always apply cleanly. An
    /// error here means the stored history breaks an invariant.
    fn apply(&mut self, event: Self::Event) -> Result<(), Self::Error>;

    /// Applies multiple events in sequence, stopping at the first failure.
    fn apply_events(
        &mut self,
        events: impl IntoIterator<Item = Self::Event>,
    ) -> Result<(), Self::Error> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Folds a full history into a fresh aggregate.
    fn replay(events: impl IntoIterator<Item = Self::Event>) -> Result<Self, Self::Error> {
        let mut aggregate = Self::default();
        let mut version = Version::initial();
        for event in events {
            aggregate.apply(event)?;
            version = version.next();
        }
        aggregate.set_version(version);
        Ok(aggregate)
    }
}
