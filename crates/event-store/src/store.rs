use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the stream must be at for the append to succeed.
    /// `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the stream to be at `version` (its event count at load time).
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Requires the stream to be empty.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// A finite stream of stored events, possibly borrowing the store.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send + 'a>>;

/// Append-only storage for per-aggregate event streams.
///
/// Only the order within one aggregate's stream is guaranteed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events to a single stream.
    ///
    /// The batch is stored atomically: either every event becomes visible
    /// or none does. When `options.expected_version` is set and the stream
    /// is at a different version, fails with `ConcurrencyConflict`.
    ///
    /// Returns the stream version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Returns every event of a stream in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the events of a stream with `version >= from_version`.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Opens a stream over one aggregate's events in version order.
    ///
    /// Every call yields a fresh stream, so replay can be repeated and
    /// reproduces the same sequence.
    async fn read_stream<'a>(&'a self, aggregate_id: &AggregateId) -> Result<EventStream<'a>>;

    /// Streams every stored event in commit order.
    async fn stream_all_events<'a>(&'a self) -> Result<EventStream<'a>>;

    /// Gets the current version of a stream, or None if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    /// Checks whether a stream has any events.
    async fn aggregate_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks the shape of a batch before it reaches storage.
///
/// A batch must be non-empty, target a single aggregate of a single type,
/// and carry consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in &events[1..] {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(
                "all events must have the same aggregate type".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
