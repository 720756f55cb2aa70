//! Projection processor for feeding events to projections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, Version};
use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::projection::Projection;
use crate::{ProjectionError, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Processes events from an event store and delivers them to projections.
///
/// The processor supports:
/// - Catch-up: replays all events from the store to bring projections up to date
/// - Live delivery: forwards published events from a subscription
/// - Rebuild: resets all projections and replays from scratch
///
/// Deliveries never interleave, so a rebuild is not raced by live events.
/// The processor remembers the last version it delivered per stream; a
/// live event at or below it (one the rebuild already replayed) is not
/// offered again, which keeps projection positions equal to the number of
/// stored events. A failing projection is retried a few times, then logged and skipped;
/// it never holds back the other projections.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    /// Held for every delivery; maps each stream to its last delivered version.
    delivery: Mutex<HashMap<AggregateId, Version>>,
    max_attempts: u32,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            delivery: Mutex::new(HashMap::new()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many times a failing projection is offered the same event.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams all events from the store and delivers them to each
    /// projection that hasn't already seen them.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let mut delivered = self.delivery.lock().await;
        self.catch_up(&mut delivered).await
    }

    /// Delivers a single event to all registered projections.
    ///
    /// Every projection is attempted; fails if any of them gave up.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        let mut delivered = self.delivery.lock().await;
        if delivered
            .get(&event.aggregate_id)
            .is_some_and(|last| event.version <= *last)
        {
            tracing::debug!(version = %event.version, "event already delivered, skipping");
            return Ok(());
        }
        delivered.insert(event.aggregate_id.clone(), event.version);

        let mut failed = Vec::new();
        for projection in &self.projections {
            if self.deliver(projection.as_ref(), event).await.is_err() {
                failed.push(projection.name());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ProjectionError::Undelivered {
                event_id: event.event_id,
                projections: failed,
            })
        }
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        let mut delivered = self.delivery.lock().await;
        delivered.clear();
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.catch_up(&mut delivered).await
    }

    /// Forwards every event received on `events` to the projections.
    ///
    /// The task ends when all senders are gone.
    pub fn spawn_subscription(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<EventEnvelope>,
    ) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.process_event(&event).await {
                    tracing::warn!(error = %e, "live event left unprojected until next rebuild");
                }
            }
            tracing::info!("event subscription closed");
        })
    }

    async fn catch_up(&self, delivered: &mut HashMap<AggregateId, Version>) -> Result<()> {
        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;
            let last = delivered
                .entry(event.aggregate_id.clone())
                .or_insert(event.version);
            *last = (*last).max(event.version);

            for projection in &self.projections {
                if projection.position().await.is_behind(event_index) {
                    // Failures are logged and counted in deliver.
                    let _ = self.deliver(projection.as_ref(), &event).await;
                }
            }
        }

        tracing::info!(events_processed = event_index, "catch-up complete");

        Ok(())
    }

    async fn deliver(&self, projection: &dyn Projection, event: &EventEnvelope) -> Result<()> {
        let mut attempt = 1;
        loop {
            match projection.handle(event).await {
                Ok(()) => {
                    metrics::counter!("projections_events_processed").increment(1);
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(projection = projection.name(), attempt, error = %e, "projection failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::counter!("projection_failures_total", "projection" => projection.name())
                        .increment(1);
                    tracing::error!(
                        projection = projection.name(),
                        event_id = %event.event_id,
                        error = %e,
                        "projection gave up on event"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, InMemoryEventStore, Version};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    /// Counts events; fails the first `failures` deliveries.
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
        failures: Arc<AtomicU32>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self::failing(0)
        }

        fn failing(failures: u32) -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::zero())),
                failures: Arc::new(AtomicU32::new(failures)),
            }
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ProjectionError::Handler {
                    projection: "CountingProjection",
                    reason: "boom".to_string(),
                });
            }
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn create_test_event(aggregate_id: &str, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("FoodCart")
            .event_type("TestEvent")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
    }

    async fn store_with_events(count: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        if count > 0 {
            let events = (1..=count).map(|v| create_test_event("cart1", v)).collect();
            store.append(events, AppendOptions::new()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_catch_up_processes_all_events() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(store_with_events(3).await);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();

        assert_eq!(*count_ref.read().await, 3);
    }

    #[tokio::test]
    async fn test_process_single_event() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(projection));

        let event = create_test_event(AggregateId::new().as_str(), 1);
        processor.process_event(&event).await.unwrap();

        assert_eq!(*count_ref.read().await, 1);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_replays() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let pos_ref = Arc::clone(&projection.position);
        let mut processor = ProjectionProcessor::new(store_with_events(2).await);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        assert_eq!(*count_ref.read().await, 2);

        processor.rebuild_all().await.unwrap();
        assert_eq!(*count_ref.read().await, 2);
        assert_eq!(pos_ref.read().await.events_processed, 2);
    }

    #[tokio::test]
    async fn test_catch_up_skips_already_processed() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(store_with_events(3).await);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(*count_ref.read().await, 3);
    }

    #[tokio::test]
    async fn test_empty_store_catch_up() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();

        assert_eq!(*count_ref.read().await, 0);
    }

    #[tokio::test]
    async fn test_multiple_projections() {
        let proj1 = CountingProjection::new();
        let proj2 = CountingProjection::new();
        let count1 = Arc::clone(&proj1.count);
        let count2 = Arc::clone(&proj2.count);
        let mut processor = ProjectionProcessor::new(store_with_events(2).await);
        processor.register(Box::new(proj1));
        processor.register(Box::new(proj2));

        processor.run_catch_up().await.unwrap();

        assert_eq!(processor.projection_count(), 2);
        assert_eq!(*count1.read().await, 2);
        assert_eq!(*count2.read().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let projection = CountingProjection::failing(2);
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(projection));

        processor
            .process_event(&create_test_event("cart1", 1))
            .await
            .unwrap();

        assert_eq!(*count_ref.read().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_does_not_block_other_projections() {
        let broken = CountingProjection::failing(u32::MAX);
        let healthy = CountingProjection::new();
        let healthy_count = Arc::clone(&healthy.count);
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(broken));
        processor.register(Box::new(healthy));

        let result = processor.process_event(&create_test_event("cart1", 1)).await;

        assert!(matches!(
            result,
            Err(ProjectionError::Undelivered { projections, .. })
                if projections == ["CountingProjection"]
        ));
        assert_eq!(*healthy_count.read().await, 1);
    }

    #[tokio::test]
    async fn test_events_replayed_by_rebuild_are_not_redelivered() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let pos_ref = Arc::clone(&projection.position);
        let store = store_with_events(2).await;
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(projection));

        processor.rebuild_all().await.unwrap();
        // Live copies of the same events, queued while the rebuild ran.
        processor
            .process_event(&create_test_event("cart1", 1))
            .await
            .unwrap();
        processor
            .process_event(&create_test_event("cart1", 2))
            .await
            .unwrap();

        assert_eq!(*count_ref.read().await, 2);
        assert_eq!(pos_ref.read().await.events_processed, 2);

        store
            .append(
                vec![create_test_event("cart1", 3)],
                AppendOptions::expect_version(Version::new(2)),
            )
            .await
            .unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(*count_ref.read().await, 3);
        assert_eq!(pos_ref.read().await.events_processed, 3);
    }

    #[tokio::test]
    async fn test_live_events_after_catch_up_are_delivered() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(store_with_events(1).await);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        processor
            .process_event(&create_test_event("cart1", 2))
            .await
            .unwrap();
        processor
            .process_event(&create_test_event("cart2", 1))
            .await
            .unwrap();

        assert_eq!(*count_ref.read().await, 3);
    }

    #[tokio::test]
    async fn test_subscription_forwards_events_until_closed() {
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(projection));

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(processor).spawn_subscription(rx);
        tx.send(create_test_event("cart1", 1)).unwrap();
        tx.send(create_test_event("cart1", 2)).unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(*count_ref.read().await, 2);
    }
}
