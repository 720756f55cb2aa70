use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

#[derive(Default)]
struct Log {
    /// Every event in commit order.
    events: Vec<EventEnvelope>,
    /// Current version of each stream.
    versions: HashMap<AggregateId, Version>,
}

impl Log {
    fn stream(&self, aggregate_id: &AggregateId, from_version: Version) -> Vec<EventEnvelope> {
        self.events
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect()
    }
}

/// In-memory event store.
///
/// Clones share the same log, so one instance can back the repository,
/// the projection processor and the HTTP layer at once.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across all streams.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    pub async fn clear(&self) {
        let mut log = self.log.write().await;
        log.events.clear();
        log.versions.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;

        let aggregate_id = events[0].aggregate_id.clone();
        let first_new_version = events[0].version;

        let mut log = self.log.write().await;
        let current_version = log
            .versions
            .get(&aggregate_id)
            .copied()
            .unwrap_or_default();

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        // Mirrors the (aggregate_id, version) uniqueness constraint of the
        // PostgreSQL store for appends without an expected version.
        if first_new_version != current_version.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current_version),
                actual: current_version,
            });
        }

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or(current_version);
        metrics::counter!("events_appended_total", "store" => "memory")
            .increment(events.len() as u64);
        log.versions.insert(aggregate_id, last_version);
        log.events.extend(events);

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        Ok(self.log.read().await.stream(aggregate_id, Version::first()))
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        Ok(self.log.read().await.stream(aggregate_id, from_version))
    }

    async fn read_stream<'a>(&'a self, aggregate_id: &AggregateId) -> Result<EventStream<'a>> {
        let events = self.get_events_for_aggregate(aggregate_id).await?;
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn stream_all_events<'a>(&'a self) -> Result<EventStream<'a>> {
        let events = self.log.read().await.events.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        Ok(self.log.read().await.versions.get(aggregate_id).copied())
    }
}
