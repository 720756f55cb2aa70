//! Loading and committing event-sourced aggregates.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use futures_util::StreamExt;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::{Command, CommandResult};
use crate::error::DomainError;

/// Repository for an event-sourced aggregate type.
///
/// The repository is responsible for:
/// 1. Rebuilding an aggregate by replaying its stream
/// 2. Running a command against the rebuilt state
/// 3. Appending the resulting events with an optimistic version check
///
/// It performs a single attempt. Retrying on conflict and serializing
/// commands per identity is the job of the
/// [`CommandDispatcher`](crate::CommandDispatcher).
pub struct AggregateRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds an aggregate from its stream.
    ///
    /// An identity with no events yields the default aggregate at version 0.
    /// A stream that cannot be replayed fails with `CorruptedStream`.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn load(&self, aggregate_id: &AggregateId) -> Result<A, DomainError> {
        let mut stream = self.store.read_stream(aggregate_id).await?;
        let mut aggregate = A::default();

        while let Some(envelope) = stream.next().await {
            let envelope = envelope?;
            let expected = aggregate.version().next();
            if envelope.version != expected {
                return Err(corrupted(
                    aggregate_id,
                    envelope.version,
                    format!("expected version {expected}"),
                ));
            }

            let event: A::Event = envelope
                .decode()
                .map_err(|e| corrupted(aggregate_id, envelope.version, e.to_string()))?;
            aggregate
                .apply(event)
                .map_err(|e| corrupted(aggregate_id, envelope.version, e.to_string()))?;
            aggregate.set_version(envelope.version);
        }

        tracing::debug!(version = %aggregate.version(), "aggregate loaded");
        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: &AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Appends events produced against `expected_version`.
    ///
    /// Fails with a concurrency conflict if the stream moved on since the
    /// aggregate was loaded. Returns the stored envelopes.
    pub async fn commit(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let envelopes = build_envelopes::<A>(aggregate_id, expected_version, events)?;

        let options = if expected_version.is_initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(expected_version)
        };
        self.store.append(envelopes.clone(), options).await?;

        Ok(envelopes)
    }

    /// Loads, handles and commits a command once.
    pub async fn execute(&self, command: &A::Command) -> Result<CommandResult<A>, DomainError> {
        let decision = self.decide(command).await?;
        self.complete(decision).await
    }

    /// Loads the aggregate and runs the command against it without
    /// touching the store's write path.
    ///
    /// Safe to abandon at any point: nothing has been stored yet.
    pub async fn decide(&self, command: &A::Command) -> Result<Decision<A>, DomainError> {
        let aggregate_id = command.aggregate_id().clone();
        let aggregate = self.load(&aggregate_id).await?;
        let events = aggregate.handle(command)?;

        Ok(Decision {
            aggregate_id,
            aggregate,
            events,
        })
    }

    /// Commits a decision and folds its events into the aggregate.
    ///
    /// A decision without events completes without touching the store.
    pub async fn complete(&self, decision: Decision<A>) -> Result<CommandResult<A>, DomainError> {
        let Decision {
            aggregate_id,
            mut aggregate,
            events,
        } = decision;
        let current_version = aggregate.version();

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                envelopes: vec![],
                new_version: current_version,
            });
        }

        let envelopes = self.commit(&aggregate_id, current_version, &events).await?;
        let new_version = envelopes
            .last()
            .map(|e| e.version)
            .unwrap_or(current_version);

        aggregate
            .apply_events(events.iter().cloned())
            .map_err(|e| corrupted(&aggregate_id, new_version, e.to_string()))?;
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            envelopes,
            new_version,
        })
    }
}

/// Outcome of handling a command, not yet committed.
pub struct Decision<A: Aggregate> {
    pub aggregate_id: AggregateId,

    /// The aggregate as loaded; its version is the expected version.
    pub aggregate: A,

    pub events: Vec<A::Event>,
}

/// Wraps domain events in envelopes numbered after `current_version`.
fn build_envelopes<A: Aggregate>(
    aggregate_id: &AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id.clone())
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .build();
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

fn corrupted(aggregate_id: &AggregateId, version: Version, reason: String) -> DomainError {
    DomainError::CorruptedStream {
        aggregate_id: aggregate_id.clone(),
        version,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::food_cart::{
        ConfirmOrder, CreateFoodCart, DeselectProduct, FoodCart, FoodCartCommand, FoodCartEvent,
        ProductId, SelectProduct,
    };
    use event_store::InMemoryEventStore;

    fn repository() -> AggregateRepository<InMemoryEventStore, FoodCart> {
        AggregateRepository::new(InMemoryEventStore::new())
    }

    async fn run(
        repository: &AggregateRepository<InMemoryEventStore, FoodCart>,
        command: impl Into<FoodCartCommand>,
    ) -> Result<CommandResult<FoodCart>, DomainError> {
        repository.execute(&command.into()).await
    }

    #[tokio::test]
    async fn test_execute_creates_aggregate() {
        let repository = repository();

        let result = run(&repository, CreateFoodCart::new("cart1")).await.unwrap();

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.envelopes.len(), 1);
        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.envelopes[0].event_type, "FoodCartCreated");
        assert_eq!(result.envelopes[0].aggregate_type, "FoodCart");
    }

    #[tokio::test]
    async fn test_execute_appends_after_current_version() {
        let repository = repository();
        run(&repository, CreateFoodCart::new("cart1")).await.unwrap();

        let result = run(&repository, SelectProduct::new("cart1", "pizza", 2))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.envelopes[0].version, Version::new(2));
        assert_eq!(
            result.aggregate.selected_quantity(&ProductId::new("pizza")),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_rejected_command_writes_nothing() {
        let repository = repository();
        run(&repository, CreateFoodCart::new("cart1")).await.unwrap();

        let result = run(&repository, DeselectProduct::new("cart1", "pizza", 1)).await;

        assert!(result.unwrap_err().is_deselection_error());
        assert_eq!(repository.store().event_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_cart_is_not_found() {
        let repository = repository();

        let result = run(&repository, ConfirmOrder::new("ghost")).await;

        assert!(matches!(
            result,
            Err(DomainError::AggregateNotFound { aggregate_type: "FoodCart", ref aggregate_id })
                if aggregate_id.as_str() == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_creation() {
        let repository = repository();
        run(&repository, CreateFoodCart::new("cart1")).await.unwrap();

        let result = run(&repository, CreateFoodCart::new("cart1")).await;

        assert!(matches!(result, Err(DomainError::DuplicateCreation { .. })));
        assert_eq!(repository.store().event_count().await, 1);
    }

    #[tokio::test]
    async fn test_noop_command_returns_without_persisting() {
        let repository = repository();
        run(&repository, CreateFoodCart::new("cart1")).await.unwrap();
        run(&repository, ConfirmOrder::new("cart1")).await.unwrap();

        let result = run(&repository, ConfirmOrder::new("cart1")).await.unwrap();

        assert!(result.is_noop());
        assert!(result.envelopes.is_empty());
        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(repository.store().event_count().await, 2);
    }

    #[tokio::test]
    async fn test_load_existing() {
        let repository = repository();
        let id = AggregateId::from("cart1");
        assert!(repository.load_existing(&id).await.unwrap().is_none());

        run(&repository, CreateFoodCart::new("cart1")).await.unwrap();

        let cart = repository.load_existing(&id).await.unwrap().unwrap();
        assert_eq!(cart.version(), Version::first());
    }

    #[tokio::test]
    async fn test_stale_commit_conflicts() {
        let repository = repository();
        let id = AggregateId::from("cart1");
        run(&repository, CreateFoodCart::new("cart1")).await.unwrap();

        let stale = repository.load(&id).await.unwrap();
        run(&repository, SelectProduct::new("cart1", "pizza", 1))
            .await
            .unwrap();

        let result = repository
            .commit(
                &id,
                stale.version(),
                &[FoodCartEvent::product_selected(
                    id.clone(),
                    ProductId::new("soda"),
                    1,
                )],
            )
            .await;

        assert!(result.unwrap_err().is_concurrency_conflict());
        assert_eq!(repository.store().event_count().await, 2);
    }

    #[tokio::test]
    async fn test_corrupted_stream_is_reported() {
        let repository = repository();
        let id = AggregateId::from("cart1");
        repository
            .commit(
                &id,
                Version::initial(),
                &[
                    FoodCartEvent::food_cart_created(id.clone()),
                    FoodCartEvent::product_deselected(id.clone(), ProductId::new("pizza"), 1),
                ],
            )
            .await
            .unwrap();

        let result = repository.load(&id).await;

        assert!(matches!(
            result,
            Err(DomainError::CorruptedStream { version, .. }) if version == Version::new(2)
        ));
    }
}
